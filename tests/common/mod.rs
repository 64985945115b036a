#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};

use nfl_totals::cache::FileCache;
use nfl_totals::dataset::{GameRecord, PlayRecord};
use nfl_totals::features::{RollingWindow, build_rolling_features};
use nfl_totals::reference::{Coords, ReferenceData};
use nfl_totals::team_games::{TeamGameTable, project_team_games};
use nfl_totals::weather::{DailyWeather, WeatherHistory, create_weather_features};

/// DET plays in a dome; the other three are outdoor venues.
pub const TEAMS: [&str; 4] = ["KC", "DEN", "BUF", "DET"];
pub const SEASONS: [i32; 3] = [2022, 2023, 2024];
pub const WEEKS: i32 = 8;
/// Season in progress in [`mid_season_schedule`].
pub const CURRENT_SEASON: i32 = 2025;
/// Weeks of [`CURRENT_SEASON`] already played.
pub const PLAYED_WEEKS: i32 = 2;

fn pairings(week: i32) -> [(&'static str, &'static str); 2] {
    let [kc, den, buf, det] = TEAMS;
    let pairs = match week % 3 {
        0 => [(kc, den), (buf, det)],
        1 => [(kc, buf), (den, det)],
        _ => [(kc, det), (den, buf)],
    };
    if week % 2 == 0 {
        pairs
    } else {
        [(pairs[0].1, pairs[0].0), (pairs[1].1, pairs[1].0)]
    }
}

fn season_games(season: i32, played_weeks: i32) -> Vec<GameRecord> {
    let opener = NaiveDate::from_ymd_opt(season, 9, 8).unwrap();
    let mut games = Vec::new();
    for week in 1..=WEEKS {
        let played = week <= played_weeks;
        for (idx, (home, away)) in pairings(week).into_iter().enumerate() {
            let idx = idx as i32;
            games.push(GameRecord {
                game_id: format!("{season}_{week:02}_{away}_{home}"),
                season,
                week,
                gameday: opener + Duration::days(7 * (week as i64 - 1)),
                home_team: home.to_string(),
                away_team: away.to_string(),
                home_score: played.then(|| 14 + (season + week * 7 + idx * 3) % 17),
                away_score: played.then(|| 10 + (season * 3 + week * 5 + idx) % 15),
                total_line: Some(42.5 + (week % 4) as f64),
            });
        }
    }
    games
}

/// Completed seasons only.
pub fn schedule() -> Vec<GameRecord> {
    SEASONS
        .into_iter()
        .flat_map(|season| season_games(season, WEEKS))
        .collect()
}

/// [`schedule`] plus the current season, where only the first
/// [`PLAYED_WEEKS`] have scores and the rest are fixtures.
pub fn mid_season_schedule() -> Vec<GameRecord> {
    let mut games = schedule();
    games.extend(season_games(CURRENT_SEASON, PLAYED_WEEKS));
    games
}

/// Last played date of [`CURRENT_SEASON`].
pub fn last_played_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(CURRENT_SEASON, 9, 8).unwrap()
        + Duration::days(7 * (PLAYED_WEEKS as i64 - 1))
}

/// Play-by-play for every played game; fixtures have none.
pub fn plays(games: &[GameRecord]) -> Vec<PlayRecord> {
    let mut out = Vec::new();
    for (g, game) in games.iter().enumerate() {
        if game.home_score.is_none() {
            continue;
        }
        for (side, (team, opp)) in [
            (&game.home_team, &game.away_team),
            (&game.away_team, &game.home_team),
        ]
        .into_iter()
        .enumerate()
        {
            let snaps = 55 + (g + side * 3) % 10;
            for n in 0..snaps {
                let pass = n % 2 == 0;
                let epa = (((g * 7 + n * 3 + side) % 11) as f64 - 5.0) / 10.0;
                out.push(PlayRecord {
                    game_id: game.game_id.clone(),
                    posteam: Some(team.clone()),
                    defteam: Some(opp.clone()),
                    play_id: (n + 1) as f64,
                    passer_player_name: pass.then(|| format!("{team}.QB")),
                    rusher_player_name: (!pass).then(|| format!("{team}.RB")),
                    qb_dropback: pass,
                    epa: Some(epa),
                    play_type: Some(if pass { "pass" } else { "run" }.to_string()),
                });
            }
        }
    }
    out
}

/// Daily weather for any range; remembers every request.
#[derive(Default)]
pub struct RecordingHistory {
    pub calls: Cell<usize>,
    pub coords: RefCell<Vec<Coords>>,
    pub ranges: RefCell<Vec<(NaiveDate, NaiveDate)>>,
}

impl WeatherHistory for RecordingHistory {
    fn daily(&self, coords: Coords, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyWeather>> {
        self.calls.set(self.calls.get() + 1);
        self.coords.borrow_mut().push(coords);
        self.ranges.borrow_mut().push((start, end));
        let mut out = Vec::new();
        let mut day = start;
        while day <= end {
            out.push(DailyWeather {
                date: day,
                temperature: Some(55.0 + (day.ordinal() % 20) as f64),
                precipitation: Some(0.0),
                wind_speed: Some(7.5),
            });
            day += Duration::days(1);
        }
        Ok(out)
    }
}

/// Projected table with every rolling engine applied, no weather yet.
pub fn rolling_table(games: &[GameRecord]) -> TeamGameTable {
    let mut table = project_team_games(games);
    build_rolling_features(&mut table, &plays(games), &RollingWindow::default());
    table
}

/// Every stage applied, weather from a fresh cache in `cache_dir`.
pub fn featured_table(cache_dir: &std::path::Path) -> TeamGameTable {
    featured_table_for(&schedule(), cache_dir)
}

pub fn featured_table_for(games: &[GameRecord], cache_dir: &std::path::Path) -> TeamGameTable {
    let mut table = rolling_table(games);
    create_weather_features(
        &mut table,
        &ReferenceData::nfl(),
        &FileCache::new(cache_dir),
        &RecordingHistory::default(),
    )
    .unwrap();
    table
}
