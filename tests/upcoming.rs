mod common;

use std::cell::Cell;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};

use nfl_totals::error::PipelineError;
use nfl_totals::evaluate::{TrainOptions, train_and_evaluate};
use nfl_totals::forecast::{DOME_STATUS, ForecastRow, ForecastSlot, ForecastSource, fetch_game_forecasts};
use nfl_totals::forest::ForestParams;
use nfl_totals::reference::{Coords, ReferenceData};
use nfl_totals::totals::MarketTotal;
use nfl_totals::upcoming::{SkipReason, assemble_upcoming, predict_upcoming};

fn kickoff(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 7, hour, 0, 0).unwrap()
}

fn market(home: &str, away: &str, at: DateTime<Utc>, line: f64) -> MarketTotal {
    MarketTotal {
        home_team: home.to_string(),
        away_team: away.to_string(),
        commence_time: at,
        total_line: line,
        bookmaker: "DraftKings".to_string(),
    }
}

fn forecast(home: &str, at: DateTime<Utc>) -> ForecastRow {
    ForecastRow {
        home_team: home.to_string(),
        kickoff: at,
        temperature_f: Some(68.0),
        wind_speed_mph: Some(9.0),
        status: "clear sky".to_string(),
    }
}

#[test]
fn complete_matchup_becomes_one_feature_row() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let totals = vec![market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5)];
    let forecasts = vec![forecast("KC", kickoff(17))];

    let assembly = assemble_upcoming(&totals, &table, &forecasts, &ReferenceData::nfl()).unwrap();
    assert!(assembly.skipped.is_empty());
    assert_eq!(assembly.ready.len(), 1);

    let game = &assembly.ready[0];
    assert_eq!((game.home_team.as_str(), game.away_team.as_str()), ("KC", "DEN"));
    assert_eq!(game.features.len(), 13);
    assert_eq!(game.features[0], 45.5);
    assert_eq!(game.features[9], 68.0);
    assert_eq!(game.features[10], 9.0);
}

#[test]
fn mid_season_form_is_taken_as_of_the_last_played_game() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table_for(&common::mid_season_schedule(), dir.path());
    let totals = vec![market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5)];
    let forecasts = vec![forecast("KC", kickoff(17))];

    let assembly = assemble_upcoming(&totals, &table, &forecasts, &ReferenceData::nfl()).unwrap();
    assert_eq!(assembly.ready.len(), 1);
    let game = &assembly.ready[0];

    let current = |team: &str| {
        let mut rows = table
            .rows
            .iter()
            .filter(|r| r.team == team && r.season == common::CURRENT_SEASON)
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| r.week);
        rows
    };
    for (team, form) in [("KC", game.matchup.home), ("DEN", game.matchup.away)] {
        let rows = current(team);
        let played = rows.iter().filter(|r| r.is_played()).collect::<Vec<_>>();
        assert_eq!(played.len(), common::PLAYED_WEEKS as usize);
        let mean = played.iter().map(|r| r.points_for.unwrap() as f64).sum::<f64>()
            / played.len() as f64;
        assert_eq!(form.points_for, Some(mean), "{team}");

        let next_fixture = rows.iter().find(|r| !r.is_played()).unwrap();
        assert_eq!(form, next_fixture.rolling, "{team}");
    }
}

#[test]
fn team_with_no_history_is_dropped_and_others_survive() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let totals = vec![
        market("Buffalo Bills", "Houston Texans", kickoff(17), 44.0),
        market("Kansas City Chiefs", "Denver Broncos", kickoff(20), 45.5),
    ];
    let forecasts = vec![forecast("BUF", kickoff(17)), forecast("KC", kickoff(20))];

    let assembly = assemble_upcoming(&totals, &table, &forecasts, &ReferenceData::nfl()).unwrap();
    assert_eq!(assembly.ready.len(), 1);
    assert_eq!(assembly.ready[0].home_team, "KC");
    assert_eq!(
        assembly.skipped[0].reason,
        SkipReason::MissingRollingHistory {
            team: "HOU".to_string()
        }
    );
}

#[test]
fn unknown_team_name_stops_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let totals = vec![market("Oakland Raiders", "Denver Broncos", kickoff(17), 41.0)];

    let err = assemble_upcoming(&totals, &table, &[], &ReferenceData::nfl()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::UnmappedTeam { name }) if name == "Oakland Raiders"
    ));
}

#[test]
fn missing_or_mistimed_forecast_drops_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let totals = vec![
        market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5),
        market("Buffalo Bills", "Detroit Lions", kickoff(17), 47.0),
    ];
    // BUF forecast is an hour off the listed kickoff.
    let forecasts = vec![forecast("BUF", kickoff(17) + Duration::hours(1))];

    let assembly = assemble_upcoming(&totals, &table, &forecasts, &ReferenceData::nfl()).unwrap();
    assert!(assembly.ready.is_empty());
    assert_eq!(assembly.skipped.len(), 2);
    assert!(assembly.skipped.iter().all(|s| s.reason == SkipReason::MissingWeather));
}

#[test]
fn undefined_forecast_value_names_the_feature() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let totals = vec![market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5)];
    let mut row = forecast("KC", kickoff(17));
    row.wind_speed_mph = None;

    let assembly = assemble_upcoming(&totals, &table, &[row], &ReferenceData::nfl()).unwrap();
    assert_eq!(
        assembly.skipped[0].reason,
        SkipReason::MissingFeature("home_wind_speed")
    );
}

#[test]
fn ready_games_are_scored_by_the_trained_model() {
    let dir = tempfile::tempdir().unwrap();
    let table = common::featured_table(dir.path());
    let opts = TrainOptions {
        train_seasons: vec![2022, 2023],
        test_seasons: vec![2024],
        forest: ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        },
        ..TrainOptions::default()
    };
    let (model, report) = train_and_evaluate(&table, &opts).unwrap();
    assert!(report.train_rows > 0);
    assert!(report.test_rows > 0);

    let totals = vec![
        market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5),
        market("Detroit Lions", "Buffalo Bills", kickoff(20), 48.5),
    ];
    let forecasts = vec![forecast("KC", kickoff(17)), forecast("DET", kickoff(20))];
    let assembly = assemble_upcoming(&totals, &table, &forecasts, &ReferenceData::nfl()).unwrap();
    let predicted = predict_upcoming(&assembly, &model).unwrap();

    assert_eq!(predicted.len(), 2);
    for p in &predicted {
        assert!(p.predicted_total.is_finite());
        assert!(p.predicted_total > 20.0 && p.predicted_total < 60.0);
    }
    assert_eq!(predicted[1].date().to_string(), "2025-09-07");
}

struct CountingForecast {
    calls: Cell<usize>,
}

impl ForecastSource for CountingForecast {
    fn forecast(&self, _coords: Coords) -> Result<Vec<ForecastSlot>> {
        self.calls.set(self.calls.get() + 1);
        Ok((0..8)
            .map(|i| ForecastSlot {
                at: kickoff(12) + Duration::hours(3 * i),
                temperature_f: Some(60.0 + i as f64),
                wind_speed_mph: Some(5.0),
                description: format!("slot {i}"),
            })
            .collect())
    }
}

#[test]
fn forecasts_skip_domes_and_query_each_venue_once() {
    let source = CountingForecast { calls: Cell::new(0) };
    let totals = vec![
        market("Kansas City Chiefs", "Denver Broncos", kickoff(17), 45.5),
        market("Kansas City Chiefs", "Denver Broncos", kickoff(23), 45.5),
        market("Detroit Lions", "Buffalo Bills", kickoff(20), 48.5),
    ];
    let rows = fetch_game_forecasts(&totals, &ReferenceData::nfl(), &source).unwrap();

    assert_eq!(source.calls.get(), 1);
    assert_eq!(rows.len(), 3);
    // 17:00 sits between the 15:00 and 18:00 slots; 18:00 is closer.
    assert_eq!(rows[0].status, "slot 2");
    assert_eq!(rows[1].status, "slot 4");
    assert_eq!(rows[2].home_team, "DET");
    assert_eq!(rows[2].status, DOME_STATUS);
    assert_eq!(rows[2].temperature_f, Some(70.0));
}
