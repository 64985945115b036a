//! Turns the upcoming slate into model-ready rows.
//!
//! Each matchup is split into a home stub and an away stub. Every stub takes
//! its team's latest form from the historical table. The home stub also gets
//! the kickoff forecast. The two stubs are then joined back into one row per
//! game. A game with any undefined input is skipped with its reason and never
//! zero-filled.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::features::{feature_names, feature_vector};
use crate::forecast::ForecastRow;
use crate::model::TotalsModel;
use crate::reference::ReferenceData;
use crate::team_games::{
    HomeWeather, MatchupFeatures, RollingFeature, RollingStats, TeamGameRow, TeamGameTable,
};
use crate::totals::MarketTotal;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The team has no rolling value at all in the historical table.
    MissingRollingHistory { team: String },
    /// No forecast matched (home team, kickoff).
    MissingWeather,
    MissingFeature(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingRollingHistory { team } => {
                write!(f, "no rolling history for {team}")
            }
            SkipReason::MissingWeather => f.write_str("no weather forecast for kickoff"),
            SkipReason::MissingFeature(name) => write!(f, "feature {name} is undefined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingGame {
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub total_line: f64,
    pub matchup: MatchupFeatures,
    /// Values in `FEATURE_NAMES` order.
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedGame {
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub ready: Vec<UpcomingGame>,
    pub skipped: Vec<SkippedGame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingPrediction {
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub total_line: f64,
    pub predicted_total: f64,
}

impl UpcomingPrediction {
    /// Game day on the US/Eastern calendar. A primetime kickoff falls after
    /// midnight UTC but belongs to the previous evening.
    pub fn date(&self) -> NaiveDate {
        self.kickoff.with_timezone(&New_York).date_naive()
    }
}

#[derive(Debug, Clone)]
struct Stub {
    team: String,
    opponent: String,
    kickoff: DateTime<Utc>,
    total_line: f64,
    is_home: bool,
    form: Option<RollingStats>,
    weather: Option<HomeWeather>,
}

/// Per team, the last non-null value of every rolling feature in
/// chronological order across all seasons, as of the last played game.
///
/// Rows are read up to and including the team's next fixture, whose prior-only
/// window ends with that last played game. Later fixtures are ignored: their
/// windows shrink to whatever played games remain in them.
pub fn latest_form(table: &TeamGameTable) -> HashMap<String, RollingStats> {
    let mut by_team: HashMap<&str, Vec<&TeamGameRow>> = HashMap::new();
    for row in &table.rows {
        by_team.entry(row.team.as_str()).or_default().push(row);
    }

    let mut out: HashMap<String, RollingStats> = HashMap::new();
    for (team, mut rows) in by_team {
        rows.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        let Some(last_played) = rows.iter().rposition(|r| r.is_played()) else {
            continue;
        };
        let cutoff = (last_played + 1).min(rows.len() - 1);
        let mut form = RollingStats::default();
        for row in &rows[..=cutoff] {
            for feature in RollingFeature::ALL {
                if let Some(value) = row.rolling.get(feature) {
                    form.set(feature, Some(value));
                }
            }
        }
        out.insert(team.to_string(), form);
    }
    out
}

fn build_stubs(
    totals: &[MarketTotal],
    refs: &ReferenceData,
) -> Result<Vec<(Stub, Stub)>> {
    let mut out = Vec::with_capacity(totals.len());
    for game in totals {
        let home = refs.team_code(&game.home_team)?.to_string();
        let away = refs.team_code(&game.away_team)?.to_string();
        let stub = |team: &str, opponent: &str, is_home: bool| Stub {
            team: team.to_string(),
            opponent: opponent.to_string(),
            kickoff: game.commence_time,
            total_line: game.total_line,
            is_home,
            form: None,
            weather: None,
        };
        out.push((stub(&home, &away, true), stub(&away, &home, false)));
    }
    Ok(out)
}

/// Builds one feature row per upcoming game. Unknown team names abort the
/// whole call; every other gap only skips the affected game.
pub fn assemble_upcoming(
    totals: &[MarketTotal],
    table: &TeamGameTable,
    forecasts: &[ForecastRow],
    refs: &ReferenceData,
) -> Result<Assembly> {
    let mut pairs = build_stubs(totals, refs)?;

    let form = latest_form(table);
    let weather = forecasts
        .iter()
        .map(|f| {
            (
                (f.home_team.as_str(), f.kickoff),
                HomeWeather {
                    temperature: f.temperature_f,
                    precipitation: None,
                    wind_speed: f.wind_speed_mph,
                },
            )
        })
        .collect::<HashMap<_, _>>();

    for (home, away) in &mut pairs {
        home.form = form.get(&home.team).copied();
        away.form = form.get(&away.team).copied();
        home.weather = weather.get(&(home.team.as_str(), home.kickoff)).copied();
    }

    let mut assembly = Assembly::default();
    for (home, away) in pairs {
        debug_assert!(home.is_home && !away.is_home);
        debug_assert_eq!(home.opponent, away.team);
        match join_stubs(&home, &away) {
            Ok((matchup, features)) => assembly.ready.push(UpcomingGame {
                home_team: home.team,
                away_team: away.team,
                kickoff: home.kickoff,
                total_line: home.total_line,
                matchup,
                features,
            }),
            Err(reason) => {
                warn!(
                    home = %home.team,
                    away = %away.team,
                    kickoff = %home.kickoff,
                    %reason,
                    "upcoming game dropped"
                );
                assembly.skipped.push(SkippedGame {
                    home_team: home.team,
                    away_team: away.team,
                    kickoff: home.kickoff,
                    reason,
                });
            }
        }
    }

    info!(
        ready = assembly.ready.len(),
        skipped = assembly.skipped.len(),
        "upcoming games assembled"
    );
    Ok(assembly)
}

fn join_stubs(home: &Stub, away: &Stub) -> Result<(MatchupFeatures, Vec<f64>), SkipReason> {
    let has_history = |form: Option<RollingStats>| {
        form.is_some_and(|f| RollingFeature::ALL.iter().any(|x| f.get(*x).is_some()))
    };
    for stub in [home, away] {
        if !has_history(stub.form) {
            return Err(SkipReason::MissingRollingHistory {
                team: stub.team.clone(),
            });
        }
    }
    let Some(weather) = home.weather else {
        return Err(SkipReason::MissingWeather);
    };

    let matchup = MatchupFeatures {
        home: home.form.unwrap_or_default(),
        away: away.form.unwrap_or_default(),
        weather,
        home_starting_qb: None,
        away_starting_qb: None,
    };
    let features =
        feature_vector(Some(home.total_line), &matchup).map_err(SkipReason::MissingFeature)?;
    Ok((matchup, features))
}

/// Scores every ready game with `model`.
pub fn predict_upcoming(assembly: &Assembly, model: &TotalsModel) -> Result<Vec<UpcomingPrediction>> {
    if assembly.ready.is_empty() {
        return Ok(Vec::new());
    }
    let matrix = assembly
        .ready
        .iter()
        .map(|g| g.features.clone())
        .collect::<Vec<_>>();
    let predicted = model.predict(&feature_names(), &matrix)?;

    Ok(assembly
        .ready
        .iter()
        .zip(predicted)
        .map(|(g, predicted_total)| UpcomingPrediction {
            home_team: g.home_team.clone(),
            away_team: g.away_team.clone(),
            kickoff: g.kickoff,
            total_line: g.total_line,
            predicted_total,
        })
        .collect())
}
