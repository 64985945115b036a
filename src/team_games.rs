//! Team-centric view of the schedule: every game becomes a home row and an
//! away row that share `game_id`, and every later stage adds typed columns to
//! those rows.

use std::collections::BTreeSet;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::GameRecord;

/// The trailing statistics each rolling engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RollingFeature {
    PointsFor,
    PointsAgainst,
    QbEpa,
    DefEpa,
    OffPace,
}

impl RollingFeature {
    pub const ALL: [RollingFeature; 5] = [
        RollingFeature::PointsFor,
        RollingFeature::PointsAgainst,
        RollingFeature::QbEpa,
        RollingFeature::DefEpa,
        RollingFeature::OffPace,
    ];

    pub fn column(self) -> &'static str {
        match self {
            RollingFeature::PointsFor => "rolling_avg_points_for",
            RollingFeature::PointsAgainst => "rolling_avg_points_against",
            RollingFeature::QbEpa => "rolling_avg_qb_epa",
            RollingFeature::DefEpa => "rolling_avg_def_epa",
            RollingFeature::OffPace => "rolling_avg_off_pace",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub points_for: Option<f64>,
    pub points_against: Option<f64>,
    pub qb_epa: Option<f64>,
    pub def_epa: Option<f64>,
    pub off_pace: Option<f64>,
}

impl RollingStats {
    pub fn get(&self, feature: RollingFeature) -> Option<f64> {
        match feature {
            RollingFeature::PointsFor => self.points_for,
            RollingFeature::PointsAgainst => self.points_against,
            RollingFeature::QbEpa => self.qb_epa,
            RollingFeature::DefEpa => self.def_epa,
            RollingFeature::OffPace => self.off_pace,
        }
    }

    pub fn set(&mut self, feature: RollingFeature, value: Option<f64>) {
        let slot = match feature {
            RollingFeature::PointsFor => &mut self.points_for,
            RollingFeature::PointsAgainst => &mut self.points_against,
            RollingFeature::QbEpa => &mut self.qb_epa,
            RollingFeature::DefEpa => &mut self.def_epa,
            RollingFeature::OffPace => &mut self.off_pace,
        };
        *slot = value;
    }
}

/// Raw same-game statistics. Never used as model input directly; the rolling
/// engines read them to build the trailing columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub starting_qb: Option<String>,
    pub qb_avg_epa: Option<f64>,
    pub def_epa: Option<f64>,
    pub plays: Option<u32>,
    pub seconds_per_play: Option<f64>,
}

/// Weather at the home venue on game day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeWeather {
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Both teams' trailing values plus venue weather, identical on the two rows
/// of a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupFeatures {
    pub home: RollingStats,
    pub away: RollingStats,
    pub weather: HomeWeather,
    pub home_starting_qb: Option<String>,
    pub away_starting_qb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamGameRow {
    pub game_id: String,
    pub season: i32,
    pub week: i32,
    pub date: NaiveDate,
    pub team: String,
    pub opponent: String,
    pub is_home: bool,
    pub points_for: Option<i32>,
    pub points_against: Option<i32>,
    pub total_points: Option<i32>,
    pub total_line: Option<f64>,
    pub stats: GameStats,
    pub rolling: RollingStats,
    pub matchup: MatchupFeatures,
}

impl TeamGameRow {
    pub fn is_played(&self) -> bool {
        self.points_for.is_some() && self.points_against.is_some()
    }

    /// Chronological key inside one team's history.
    pub fn order_key(&self) -> (i32, i32, NaiveDate, &str) {
        (self.season, self.week, self.date, self.game_id.as_str())
    }
}

/// Stages that add columns to the table. Downstream consumers declare which
/// ones they need instead of probing for column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Scoring,
    Qb,
    Defense,
    Pace,
    Weather,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Scoring,
        Stage::Qb,
        Stage::Defense,
        Stage::Pace,
        Stage::Weather,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamGameTable {
    pub rows: Vec<TeamGameRow>,
    completed: BTreeSet<Stage>,
}

impl TeamGameTable {
    pub fn from_rows(rows: Vec<TeamGameRow>, completed: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            rows,
            completed: completed.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn mark(&mut self, stage: Stage) {
        self.completed.insert(stage);
    }

    pub fn has(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    pub fn completed(&self) -> impl Iterator<Item = Stage> + '_ {
        self.completed.iter().copied()
    }

    pub fn require(&self, stages: &[Stage]) -> Result<()> {
        let missing = stages
            .iter()
            .filter(|s| !self.completed.contains(s))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("team-game table is missing stages {missing:?}"))
        }
    }

    pub fn home_rows(&self) -> impl Iterator<Item = &TeamGameRow> {
        self.rows.iter().filter(|r| r.is_home)
    }
}

/// Splits each game into its home and away perspectives, sorted by team then
/// chronology.
pub fn project_team_games(games: &[GameRecord]) -> TeamGameTable {
    let mut rows = Vec::with_capacity(games.len() * 2);
    for game in games {
        let total_points = match (game.home_score, game.away_score) {
            (Some(h), Some(a)) => Some(h + a),
            _ => None,
        };
        rows.push(TeamGameRow {
            game_id: game.game_id.clone(),
            season: game.season,
            week: game.week,
            date: game.gameday,
            team: game.home_team.clone(),
            opponent: game.away_team.clone(),
            is_home: true,
            points_for: game.home_score,
            points_against: game.away_score,
            total_points,
            total_line: game.total_line,
            stats: GameStats::default(),
            rolling: RollingStats::default(),
            matchup: MatchupFeatures::default(),
        });
        rows.push(TeamGameRow {
            game_id: game.game_id.clone(),
            season: game.season,
            week: game.week,
            date: game.gameday,
            team: game.away_team.clone(),
            opponent: game.home_team.clone(),
            is_home: false,
            points_for: game.away_score,
            points_against: game.home_score,
            total_points,
            total_line: game.total_line,
            stats: GameStats::default(),
            rolling: RollingStats::default(),
            matchup: MatchupFeatures::default(),
        });
    }

    rows.sort_by(|a, b| a.team.cmp(&b.team).then(a.order_key().cmp(&b.order_key())));
    info!(games = games.len(), rows = rows.len(), "team-game rows projected");
    TeamGameTable::from_rows(rows, [])
}
