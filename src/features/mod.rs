//! Rolling feature engines and the model's input contract.

pub mod defense;
pub mod pace;
pub mod qb;
pub mod rolling;
pub mod scoring;

use crate::dataset::PlayRecord;
use crate::team_games::{MatchupFeatures, TeamGameTable};

pub use rolling::{NullPolicy, RollingWindow};

/// Model input columns, in the order the model is trained and scored with.
pub const FEATURE_NAMES: [&str; 13] = [
    "total_line",
    "home_rolling_avg_points_for",
    "home_rolling_avg_points_against",
    "away_rolling_avg_points_for",
    "away_rolling_avg_points_against",
    "home_rolling_avg_qb_epa",
    "away_rolling_avg_qb_epa",
    "home_rolling_avg_def_epa",
    "away_rolling_avg_def_epa",
    "home_temperature",
    "home_wind_speed",
    "home_rolling_avg_off_pace",
    "away_rolling_avg_off_pace",
];

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Feature values in `FEATURE_NAMES` order, undefined ones left as `None`.
pub fn feature_values(total_line: Option<f64>, m: &MatchupFeatures) -> [Option<f64>; 13] {
    [
        total_line,
        m.home.points_for,
        m.home.points_against,
        m.away.points_for,
        m.away.points_against,
        m.home.qb_epa,
        m.away.qb_epa,
        m.home.def_epa,
        m.away.def_epa,
        m.weather.temperature,
        m.weather.wind_speed,
        m.home.off_pace,
        m.away.off_pace,
    ]
}

/// The complete vector, or the name of the first undefined feature.
pub fn feature_vector(
    total_line: Option<f64>,
    m: &MatchupFeatures,
) -> Result<Vec<f64>, &'static str> {
    feature_values(total_line, m)
        .iter()
        .zip(FEATURE_NAMES)
        .map(|(v, name)| v.filter(|x| x.is_finite()).ok_or(name))
        .collect()
}

/// Runs the four rolling engines over the projected table. Order does not
/// matter; each one only adds its own columns.
pub fn build_rolling_features(
    table: &mut TeamGameTable,
    plays: &[PlayRecord],
    window: &RollingWindow,
) {
    scoring::create_scoring_features(table, window);
    qb::create_qb_features(table, plays, window);
    defense::create_defense_features(table, plays, window);
    pace::create_pace_features(table, plays, window);
}
