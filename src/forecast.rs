//! Kickoff weather forecasts for upcoming games.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{CacheKey, FileCache};
use crate::error::PipelineError;
use crate::http_client::get_text;
use crate::reference::{Coords, ReferenceData};
use crate::totals::MarketTotal;

const OWM_FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
pub const DOME_STATUS: &str = "indoor/dome";

/// Forecast at the home venue for one kickoff, keyed by home short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub home_team: String,
    pub kickoff: DateTime<Utc>,
    pub temperature_f: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub status: String,
}

/// One slot of a multi-day forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSlot {
    pub at: DateTime<Utc>,
    pub temperature_f: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub description: String,
}

pub trait ForecastSource {
    fn forecast(&self, coords: Coords) -> Result<Vec<ForecastSlot>>;
}

#[derive(Debug, Clone)]
pub struct OpenWeatherForecast {
    api_key: String,
}

impl OpenWeatherForecast {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl ForecastSource for OpenWeatherForecast {
    fn forecast(&self, coords: Coords) -> Result<Vec<ForecastSlot>> {
        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        let body = get_text(
            OWM_FORECAST_URL,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "imperial"),
            ],
        )
        .context("openweathermap forecast request failed")?;
        parse_owm_forecast(&body)
    }
}

pub fn parse_owm_forecast(raw: &str) -> Result<Vec<ForecastSlot>> {
    let value: Value = serde_json::from_str(raw.trim()).context("invalid forecast json")?;
    let list = value
        .get("list")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("forecast payload missing list"))?;

    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let Some(at) = item
            .get("dt")
            .and_then(|v| v.as_i64())
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        else {
            continue;
        };
        let description = item
            .get("weather")
            .and_then(|w| w.get(0))
            .and_then(|w| w.get("description"))
            .and_then(|d| d.as_str())
            .unwrap_or_default()
            .to_string();
        out.push(ForecastSlot {
            at,
            temperature_f: item
                .get("main")
                .and_then(|m| m.get("temp"))
                .and_then(|t| t.as_f64()),
            wind_speed_mph: item
                .get("wind")
                .and_then(|w| w.get("speed"))
                .and_then(|s| s.as_f64()),
            description,
        });
    }
    Ok(out)
}

fn closest_slot(slots: &[ForecastSlot], kickoff: DateTime<Utc>) -> Option<&ForecastSlot> {
    slots
        .iter()
        .min_by_key(|s| (s.at - kickoff).num_seconds().abs())
}

/// One forecast row per upcoming game. Dome venues never reach `source`.
/// Each outdoor venue is queried once even when it hosts several games.
pub fn fetch_game_forecasts(
    totals: &[MarketTotal],
    refs: &ReferenceData,
    source: &dyn ForecastSource,
) -> Result<Vec<ForecastRow>> {
    let mut by_venue: HashMap<String, Vec<ForecastSlot>> = HashMap::new();
    let mut out = Vec::with_capacity(totals.len());

    for game in totals {
        let home = refs.team_code(&game.home_team)?.to_string();
        if refs.is_dome(&home) {
            out.push(ForecastRow {
                home_team: home,
                kickoff: game.commence_time,
                temperature_f: Some(70.0),
                wind_speed_mph: Some(0.0),
                status: DOME_STATUS.to_string(),
            });
            continue;
        }

        let Some(coords) = refs.stadium(&home) else {
            warn!(home = %home, "no coordinates for home venue, forecast skipped");
            continue;
        };
        if !by_venue.contains_key(&home) {
            let slots = source
                .forecast(coords)
                .map_err(|e| PipelineError::fetch("weather forecast", format!("{home}: {e:#}")))?;
            by_venue.insert(home.clone(), slots);
        }
        let slots = by_venue.get(&home).map(Vec::as_slice).unwrap_or_default();

        let Some(slot) = closest_slot(slots, game.commence_time) else {
            warn!(home = %home, kickoff = %game.commence_time, "empty forecast, game skipped");
            continue;
        };
        out.push(ForecastRow {
            home_team: home,
            kickoff: game.commence_time,
            temperature_f: slot.temperature_f,
            wind_speed_mph: slot.wind_speed_mph,
            status: slot.description.clone(),
        });
    }
    Ok(out)
}

/// Forecasts for this run's slate, fetched at most once per run date.
pub fn load_forecasts(
    cache: &FileCache,
    totals: &[MarketTotal],
    refs: &ReferenceData,
    source: &dyn ForecastSource,
    run_date: NaiveDate,
) -> Result<Vec<ForecastRow>> {
    let key = CacheKey::new("forecast", [run_date.format("%Y-%m-%d").to_string()]);
    let cached = cache.get_or_fetch(&key, || fetch_game_forecasts(totals, refs, source))?;
    info!(
        games = cached.value.len(),
        cached = cached.hit,
        "weather forecasts ready for upcoming games"
    );
    Ok(cached.value)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::{ForecastSlot, closest_slot, parse_owm_forecast};

    #[test]
    fn parses_slots_and_picks_nearest_to_kickoff() {
        let raw = r#"{"list":[
            {"dt":1757257200,"main":{"temp":78.1},"wind":{"speed":6.2},"weather":[{"description":"clear sky"}]},
            {"dt":1757268000,"main":{"temp":81.4},"wind":{"speed":8.9},"weather":[{"description":"few clouds"}]}
        ]}"#;
        let slots = parse_owm_forecast(raw).unwrap();
        assert_eq!(slots.len(), 2);

        let kickoff: DateTime<Utc> = "2025-09-07T20:25:00Z".parse().unwrap();
        let slot = closest_slot(&slots, kickoff).unwrap();
        assert_eq!(slot.description, "few clouds");
        assert_eq!(slot.temperature_f, Some(81.4));
    }

    #[test]
    fn no_slots_means_no_match() {
        let slots: Vec<ForecastSlot> = Vec::new();
        assert!(closest_slot(&slots, Utc::now()).is_none());
    }
}
