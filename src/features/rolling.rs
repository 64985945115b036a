//! Trailing-window machinery shared by every rolling engine.
//!
//! Each team's rows are grouped per season, ordered chronologically, and the
//! value at position `k` is computed from positions `k - size .. k` only. The
//! row's own statistic never enters its window.

use std::collections::HashMap;

use crate::team_games::{RollingFeature, TeamGameRow, TeamGameTable};

pub const DEFAULT_WINDOW: usize = 5;

/// What a window does with undefined observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Average the defined values that remain; undefined ones are ignored.
    Skip,
    /// Any undefined value makes the whole window undefined.
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    pub size: usize,
    pub min_periods: usize,
    pub nulls: NullPolicy,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self {
            size: DEFAULT_WINDOW,
            min_periods: 1,
            nulls: NullPolicy::Skip,
        }
    }
}

impl RollingWindow {
    pub fn with_size(size: usize) -> Self {
        Self {
            size: size.max(1),
            ..Self::default()
        }
    }
}

/// Mean of the `size` values strictly before each position.
pub fn trailing_prior_means(values: &[Option<f64>], window: &RollingWindow) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for k in 0..values.len() {
        let prior = &values[k.saturating_sub(window.size)..k];
        out.push(window_mean(prior, window));
    }
    out
}

fn window_mean(prior: &[Option<f64>], window: &RollingWindow) -> Option<f64> {
    if window.nulls == NullPolicy::Propagate && prior.iter().any(Option::is_none) {
        return None;
    }
    let defined = prior.iter().flatten().copied().collect::<Vec<_>>();
    if defined.is_empty() || defined.len() < window.min_periods {
        return None;
    }
    Some(defined.iter().sum::<f64>() / defined.len() as f64)
}

/// Writes `feature` onto every row's own rolling slot, computed per
/// (team, season) from `stat`, then mirrors the home and away values onto
/// both rows of each game.
pub fn roll_feature(
    table: &mut TeamGameTable,
    feature: RollingFeature,
    window: &RollingWindow,
    stat: impl Fn(&TeamGameRow) -> Option<f64>,
) {
    let mut groups: HashMap<(&str, i32), Vec<usize>> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        groups.entry((row.team.as_str(), row.season)).or_default().push(i);
    }

    let mut updates = Vec::with_capacity(table.rows.len());
    for mut idx in groups.into_values() {
        idx.sort_by(|a, b| table.rows[*a].order_key().cmp(&table.rows[*b].order_key()));
        let values = idx.iter().map(|i| stat(&table.rows[*i])).collect::<Vec<_>>();
        let rolled = trailing_prior_means(&values, window);
        updates.extend(idx.into_iter().zip(rolled));
    }
    for (i, value) in updates {
        table.rows[i].rolling.set(feature, value);
    }

    mirror_feature(table, feature);
}

/// Copies each game's home-row and away-row values for `feature` into the
/// `matchup.home` / `matchup.away` slots of both rows of that game.
pub fn mirror_feature(table: &mut TeamGameTable, feature: RollingFeature) {
    let mut home: HashMap<String, Option<f64>> = HashMap::new();
    let mut away: HashMap<String, Option<f64>> = HashMap::new();
    for row in &table.rows {
        let side = if row.is_home { &mut home } else { &mut away };
        side.insert(row.game_id.clone(), row.rolling.get(feature));
    }
    for row in &mut table.rows {
        row.matchup
            .home
            .set(feature, home.get(&row.game_id).copied().flatten());
        row.matchup
            .away
            .set(feature, away.get(&row.game_id).copied().flatten());
    }
}
