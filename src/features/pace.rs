use std::collections::HashMap;

use tracing::info;

use super::rolling::{RollingWindow, roll_feature};
use crate::dataset::PlayRecord;
use crate::team_games::{RollingFeature, Stage, TeamGameTable};

const SECONDS_PER_GAME: f64 = 3600.0;

/// Offensive snaps per (game_id, possession team). Rows with no play type
/// (timeouts, period ends) are not snaps.
pub fn plays_per_game(plays: &[PlayRecord]) -> HashMap<(String, String), u32> {
    let mut counts: HashMap<(&str, &str), u32> = HashMap::new();
    for play in plays {
        if play.play_type.is_none() {
            continue;
        }
        let Some(team) = play.posteam.as_deref() else {
            continue;
        };
        *counts.entry((play.game_id.as_str(), team)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((game_id, team), n)| ((game_id.to_string(), team.to_string()), n))
        .collect()
}

pub fn seconds_per_play(plays: u32) -> Option<f64> {
    if plays == 0 {
        None
    } else {
        Some(SECONDS_PER_GAME / plays as f64)
    }
}

pub fn create_pace_features(
    table: &mut TeamGameTable,
    plays: &[PlayRecord],
    window: &RollingWindow,
) {
    let counts = plays_per_game(plays);
    for row in &mut table.rows {
        let n = counts.get(&(row.game_id.clone(), row.team.clone())).copied();
        row.stats.plays = n;
        row.stats.seconds_per_play = n.and_then(seconds_per_play);
    }
    roll_feature(table, RollingFeature::OffPace, window, |row| {
        row.stats.seconds_per_play
    });
    table.mark(Stage::Pace);
    info!(team_games = counts.len(), "team pace features created");
}

#[cfg(test)]
mod tests {
    use super::{plays_per_game, seconds_per_play};
    use crate::dataset::PlayRecord;

    fn snap(team: &str, play_type: Option<&str>) -> PlayRecord {
        PlayRecord {
            game_id: "g1".to_string(),
            posteam: Some(team.to_string()),
            defteam: None,
            play_id: 1.0,
            passer_player_name: None,
            rusher_player_name: None,
            qb_dropback: false,
            epa: None,
            play_type: play_type.map(str::to_string),
        }
    }

    #[test]
    fn counts_only_real_snaps() {
        let plays = vec![
            snap("SEA", Some("pass")),
            snap("SEA", Some("run")),
            snap("SEA", None),
            snap("SF", Some("punt")),
        ];
        let counts = plays_per_game(&plays);
        assert_eq!(counts[&("g1".to_string(), "SEA".to_string())], 2);
        assert_eq!(counts[&("g1".to_string(), "SF".to_string())], 1);
    }

    #[test]
    fn pace_is_game_seconds_over_snaps() {
        assert_eq!(seconds_per_play(60), Some(60.0));
        assert_eq!(seconds_per_play(0), None);
    }
}
