use std::collections::HashMap;

use tracing::info;

use super::rolling::{RollingWindow, roll_feature};
use crate::dataset::PlayRecord;
use crate::team_games::{RollingFeature, Stage, TeamGameTable};

/// Mean EPA allowed per (game_id, defending team). Plays without EPA are
/// ignored; a team-game with none at all has no entry.
pub fn defensive_epa(plays: &[PlayRecord]) -> HashMap<(String, String), f64> {
    let mut sums: HashMap<(&str, &str), (f64, usize)> = HashMap::new();
    for play in plays {
        let (Some(team), Some(epa)) = (play.defteam.as_deref(), play.epa) else {
            continue;
        };
        let entry = sums.entry((play.game_id.as_str(), team)).or_insert((0.0, 0));
        entry.0 += epa;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|((game_id, team), (sum, n))| {
            ((game_id.to_string(), team.to_string()), sum / n as f64)
        })
        .collect()
}

pub fn create_defense_features(
    table: &mut TeamGameTable,
    plays: &[PlayRecord],
    window: &RollingWindow,
) {
    let def_epa = defensive_epa(plays);
    for row in &mut table.rows {
        row.stats.def_epa = def_epa
            .get(&(row.game_id.clone(), row.team.clone()))
            .copied();
    }
    roll_feature(table, RollingFeature::DefEpa, window, |row| row.stats.def_epa);
    table.mark(Stage::Defense);
    info!(team_games = def_epa.len(), "team defense EPA features created");
}

#[cfg(test)]
mod tests {
    use super::defensive_epa;
    use crate::dataset::PlayRecord;

    fn play(defteam: Option<&str>, epa: Option<f64>) -> PlayRecord {
        PlayRecord {
            game_id: "g1".to_string(),
            posteam: Some("BUF".to_string()),
            defteam: defteam.map(str::to_string),
            play_id: 1.0,
            passer_player_name: None,
            rusher_player_name: None,
            qb_dropback: false,
            epa,
            play_type: Some("run".to_string()),
        }
    }

    #[test]
    fn averages_only_plays_with_epa() {
        let plays = vec![
            play(Some("MIA"), Some(0.3)),
            play(Some("MIA"), Some(-0.1)),
            play(Some("MIA"), None),
            play(None, Some(5.0)),
        ];
        let out = defensive_epa(&plays);
        assert_eq!(out.len(), 1);
        let v = out[&("g1".to_string(), "MIA".to_string())];
        assert!((v - 0.1).abs() < 1e-12);
    }
}
