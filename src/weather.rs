//! Observed game-day weather at the home venue.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{CacheKey, FileCache};
use crate::error::PipelineError;
use crate::http_client::get_text;
use crate::reference::{Coords, ReferenceData};
use crate::team_games::{HomeWeather, Stage, TeamGameTable};

const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Conditions assigned to every game in an enclosed stadium.
pub const DOME_WEATHER: HomeWeather = HomeWeather {
    temperature: Some(70.0),
    precipitation: Some(0.0),
    wind_speed: Some(0.0),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    /// Mean temperature, °F.
    pub temperature: Option<f64>,
    /// Total precipitation, inches.
    pub precipitation: Option<f64>,
    /// Max wind speed, mph.
    pub wind_speed: Option<f64>,
}

impl DailyWeather {
    fn as_home_weather(&self) -> HomeWeather {
        HomeWeather {
            temperature: self.temperature,
            precipitation: self.precipitation,
            wind_speed: self.wind_speed,
        }
    }
}

/// Source of daily observations for one location.
pub trait WeatherHistory {
    fn daily(&self, coords: Coords, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyWeather>>;
}

#[derive(Debug, Clone)]
pub struct OpenMeteoArchive {
    base_url: String,
}

impl Default for OpenMeteoArchive {
    fn default() -> Self {
        Self {
            base_url: OPEN_METEO_ARCHIVE_URL.to_string(),
        }
    }
}

impl WeatherHistory for OpenMeteoArchive {
    fn daily(&self, coords: Coords, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyWeather>> {
        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let body = get_text(
            &self.base_url,
            &[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                (
                    "daily",
                    "temperature_2m_mean,precipitation_sum,wind_speed_10m_max",
                ),
                ("temperature_unit", "fahrenheit"),
                ("wind_speed_unit", "mph"),
                ("precipitation_unit", "inch"),
                ("timezone", "auto"),
            ],
        )
        .context("open-meteo archive request failed")?;
        parse_open_meteo_daily(&body)
    }
}

pub fn parse_open_meteo_daily(raw: &str) -> Result<Vec<DailyWeather>> {
    let value: Value = serde_json::from_str(raw.trim()).context("invalid open-meteo json")?;
    let daily = value
        .get("daily")
        .ok_or_else(|| anyhow!("open-meteo payload missing daily block"))?;
    let times = daily
        .get("time")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("open-meteo payload missing daily.time"))?;

    let series = |name: &str| -> Vec<Option<f64>> {
        daily
            .get(name)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().map(|x| x.as_f64()).collect())
            .unwrap_or_default()
    };
    let temps = series("temperature_2m_mean");
    let precip = series("precipitation_sum");
    let wind = series("wind_speed_10m_max");

    let mut out = Vec::with_capacity(times.len());
    for (i, t) in times.iter().enumerate() {
        let Some(date) = t
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            continue;
        };
        out.push(DailyWeather {
            date,
            temperature: temps.get(i).copied().flatten(),
            precipitation: precip.get(i).copied().flatten(),
            wind_speed: wind.get(i).copied().flatten(),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherSummary {
    pub dome_games: usize,
    pub observed_games: usize,
    pub missing_games: usize,
    pub cache_hits: usize,
    pub fetches: usize,
}

/// Attaches home-venue weather to both rows of every played game. Dome teams
/// get [`DOME_WEATHER`] without any lookup; outdoor teams are looked up once
/// per team for the span of their played home dates, through `cache`.
/// Unplayed fixtures have no observations and keep undefined weather.
pub fn create_weather_features(
    table: &mut TeamGameTable,
    refs: &ReferenceData,
    cache: &FileCache,
    source: &dyn WeatherHistory,
) -> Result<WeatherSummary> {
    let mut home_games: BTreeMap<&str, Vec<(&str, NaiveDate)>> = BTreeMap::new();
    for row in table.home_rows().filter(|r| r.is_played()) {
        home_games
            .entry(row.team.as_str())
            .or_default()
            .push((row.game_id.as_str(), row.date));
    }

    let mut summary = WeatherSummary::default();
    let mut by_game: HashMap<String, HomeWeather> = HashMap::new();

    for (team, games) in &home_games {
        if refs.is_dome(team) {
            for (game_id, _) in games {
                by_game.insert(game_id.to_string(), DOME_WEATHER);
            }
            summary.dome_games += games.len();
            continue;
        }

        let Some(coords) = refs.stadium(team) else {
            warn!(team, games = games.len(), "no stadium coordinates, weather left undefined");
            summary.missing_games += games.len();
            continue;
        };
        let (Some(start), Some(end)) = (
            games.iter().map(|(_, d)| *d).min(),
            games.iter().map(|(_, d)| *d).max(),
        ) else {
            continue;
        };

        let key = CacheKey::new(
            "weather",
            [
                team.to_string(),
                start.format("%Y-%m-%d").to_string(),
                end.format("%Y-%m-%d").to_string(),
            ],
        );
        let cached = cache.get_or_fetch(&key, || {
            source
                .daily(coords, start, end)
                .map_err(|e| {
                    anyhow::Error::from(PipelineError::fetch(
                        "historical weather",
                        format!("{team}: {e:#}"),
                    ))
                })
        })?;
        if cached.hit {
            summary.cache_hits += 1;
        } else {
            summary.fetches += 1;
        }

        let by_date = cached
            .value
            .iter()
            .map(|d| (d.date, d.as_home_weather()))
            .collect::<HashMap<_, _>>();
        for (game_id, date) in games {
            match by_date.get(date) {
                Some(w) => {
                    by_game.insert(game_id.to_string(), *w);
                    summary.observed_games += 1;
                }
                None => summary.missing_games += 1,
            }
        }
    }

    for row in &mut table.rows {
        row.matchup.weather = by_game.get(&row.game_id).copied().unwrap_or_default();
    }
    table.mark(Stage::Weather);
    info!(
        dome = summary.dome_games,
        observed = summary.observed_games,
        missing = summary.missing_games,
        cache_hits = summary.cache_hits,
        fetches = summary.fetches,
        "weather features created"
    );
    Ok(summary)
}
