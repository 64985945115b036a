//! Starting-quarterback efficiency.
//!
//! The starter is the passer on the team's first pass attempt of the game.
//! A play counts toward a quarterback when it was their pass, when it was a
//! dropback, or when the ball carrier also threw a pass for the same team in
//! the same game. With two passers in one game a scramble can be
//! credited to either of them; that approximation is kept as is.

use std::collections::{HashMap, HashSet};

use tracing::info;

use super::rolling::{RollingWindow, roll_feature};
use crate::dataset::PlayRecord;
use crate::team_games::{RollingFeature, Stage, TeamGameTable};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QbGame {
    pub starting_qb: Option<String>,
    /// Mean EPA per quarterback over the plays attributed to them.
    pub epa_by_qb: HashMap<String, f64>,
}

impl QbGame {
    pub fn starter_epa(&self) -> Option<f64> {
        let name = self.starting_qb.as_ref()?;
        self.epa_by_qb.get(name).copied()
    }
}

/// Per (game_id, team) quarterback summary.
pub fn summarize_qb_games(plays: &[PlayRecord]) -> HashMap<(String, String), QbGame> {
    let mut grouped: HashMap<(&str, &str), Vec<&PlayRecord>> = HashMap::new();
    for play in plays {
        let Some(team) = play.posteam.as_deref() else {
            continue;
        };
        grouped
            .entry((play.game_id.as_str(), team))
            .or_default()
            .push(play);
    }

    let mut out = HashMap::with_capacity(grouped.len());
    for ((game_id, team), mut team_plays) in grouped {
        team_plays.sort_by(|a, b| a.play_id.total_cmp(&b.play_id));

        let starting_qb = team_plays
            .iter()
            .find_map(|p| p.passer_player_name.clone());
        let passers = team_plays
            .iter()
            .filter_map(|p| p.passer_player_name.as_deref())
            .collect::<HashSet<_>>();

        let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
        for play in &team_plays {
            let rusher_is_qb = play
                .rusher_player_name
                .as_deref()
                .is_some_and(|r| passers.contains(r));
            if play.passer_player_name.is_none() && !play.qb_dropback && !rusher_is_qb {
                continue;
            }
            let Some(qb) = play
                .passer_player_name
                .as_deref()
                .or(play.rusher_player_name.as_deref())
            else {
                continue;
            };
            let Some(epa) = play.epa else {
                continue;
            };
            let entry = sums.entry(qb).or_insert((0.0, 0));
            entry.0 += epa;
            entry.1 += 1;
        }

        let epa_by_qb = sums
            .into_iter()
            .map(|(qb, (sum, n))| (qb.to_string(), sum / n as f64))
            .collect();

        out.insert(
            (game_id.to_string(), team.to_string()),
            QbGame {
                starting_qb,
                epa_by_qb,
            },
        );
    }
    out
}

pub fn create_qb_features(
    table: &mut TeamGameTable,
    plays: &[PlayRecord],
    window: &RollingWindow,
) {
    let summaries = summarize_qb_games(plays);

    for row in &mut table.rows {
        let key = (row.game_id.clone(), row.team.clone());
        match summaries.get(&key) {
            Some(qb) => {
                row.stats.starting_qb = qb.starting_qb.clone();
                row.stats.qb_avg_epa = qb.starter_epa();
            }
            None => {
                row.stats.starting_qb = None;
                row.stats.qb_avg_epa = None;
            }
        }
    }

    roll_feature(table, RollingFeature::QbEpa, window, |row| {
        row.stats.qb_avg_epa
    });
    mirror_starters(table);

    table.mark(Stage::Qb);
    info!(team_games = summaries.len(), "QB EPA features created");
}

fn mirror_starters(table: &mut TeamGameTable) {
    let mut home: HashMap<String, Option<String>> = HashMap::new();
    let mut away: HashMap<String, Option<String>> = HashMap::new();
    for row in &table.rows {
        let side = if row.is_home { &mut home } else { &mut away };
        side.insert(row.game_id.clone(), row.stats.starting_qb.clone());
    }
    for row in &mut table.rows {
        row.matchup.home_starting_qb = home.get(&row.game_id).cloned().flatten();
        row.matchup.away_starting_qb = away.get(&row.game_id).cloned().flatten();
    }
}
