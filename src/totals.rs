//! Market point-total lines for upcoming games.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{CacheKey, FileCache};
use crate::error::PipelineError;
use crate::http_client::get_text;

const ODDS_API_URL: &str = "https://api.the-odds-api.com/v4/sports/americanfootball_nfl/odds";
pub const DEFAULT_BOOKMAKER: &str = "draftkings";

/// One upcoming matchup as the odds feed names it: full team names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTotal {
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub total_line: f64,
    pub bookmaker: String,
}

pub trait TotalsSource {
    fn upcoming_totals(&self) -> Result<Vec<MarketTotal>>;

    /// Bookmaker whose lines this source reports; part of the cache key.
    fn bookmaker(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct OddsEvent {
    commence_time: String,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Deserialize)]
struct OddsBookmaker {
    #[serde(default)]
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsOutcome {
    name: String,
    #[serde(default)]
    point: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OddsApiTotals {
    api_key: String,
    bookmaker: String,
    regions: String,
}

impl OddsApiTotals {
    pub fn new(api_key: impl Into<String>, bookmaker: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            bookmaker: bookmaker.into().trim().to_ascii_lowercase(),
            regions: "us".to_string(),
        }
    }
}

impl TotalsSource for OddsApiTotals {
    fn upcoming_totals(&self) -> Result<Vec<MarketTotal>> {
        let body = get_text(
            ODDS_API_URL,
            &[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", "totals"),
                ("oddsFormat", "american"),
                ("dateFormat", "iso"),
            ],
        )
        .context("odds request failed")?;
        parse_odds_totals(&body, &self.bookmaker)
    }

    fn bookmaker(&self) -> &str {
        &self.bookmaker
    }
}

/// Keeps the "Over" point of the `bookmaker` totals market for each event.
/// Events the bookmaker does not price are skipped.
pub fn parse_odds_totals(raw: &str, bookmaker: &str) -> Result<Vec<MarketTotal>> {
    let events: Vec<OddsEvent> =
        serde_json::from_str(raw.trim()).context("invalid odds json")?;

    let mut out = Vec::new();
    for event in events {
        let Some(book) = event.bookmakers.iter().find(|b| {
            b.key.eq_ignore_ascii_case(bookmaker) || b.title.eq_ignore_ascii_case(bookmaker)
        }) else {
            continue;
        };
        let Ok(commence_time) = DateTime::parse_from_rfc3339(&event.commence_time) else {
            warn!(
                home = %event.home_team,
                raw = %event.commence_time,
                "unparseable commence_time, event skipped"
            );
            continue;
        };
        let line = book
            .markets
            .iter()
            .filter(|m| m.key == "totals")
            .flat_map(|m| m.outcomes.iter())
            .find(|o| o.name == "Over")
            .and_then(|o| o.point);
        let Some(total_line) = line else {
            continue;
        };
        out.push(MarketTotal {
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            commence_time: commence_time.with_timezone(&Utc),
            total_line,
            bookmaker: book.title.clone(),
        });
    }
    Ok(out)
}

/// Totals for `run_date`, fetched at most once per day and bookmaker.
pub fn load_totals(
    cache: &FileCache,
    source: &dyn TotalsSource,
    run_date: NaiveDate,
) -> Result<Vec<MarketTotal>> {
    let key = CacheKey::new(
        "totals",
        [run_date.format("%Y-%m-%d").to_string(), source.bookmaker().to_string()],
    );
    let cached = cache.get_or_fetch(&key, || {
        source
            .upcoming_totals()
            .map_err(|e| anyhow::Error::from(PipelineError::fetch("odds", format!("{e:#}"))))
    })?;
    if cached.hit {
        info!(games = cached.value.len(), "read cached market totals for upcoming games");
    } else {
        info!(games = cached.value.len(), "downloaded fresh market totals for upcoming games");
    }
    Ok(cached.value)
}

#[cfg(test)]
mod tests {
    use super::parse_odds_totals;

    const RAW: &str = r#"[
      {"commence_time":"2025-09-07T17:00:00Z","home_team":"Kansas City Chiefs","away_team":"Denver Broncos",
       "bookmakers":[
         {"key":"fanduel","title":"FanDuel","markets":[{"key":"totals","outcomes":[{"name":"Over","price":-110,"point":44.5}]}]},
         {"key":"draftkings","title":"DraftKings","markets":[{"key":"totals","outcomes":[
            {"name":"Under","price":-110,"point":45.5},{"name":"Over","price":-110,"point":45.5}]}]}]},
      {"commence_time":"2025-09-07T20:25:00Z","home_team":"Seattle Seahawks","away_team":"San Francisco 49ers",
       "bookmakers":[{"key":"fanduel","title":"FanDuel","markets":[]}]},
      {"commence_time":"2025-09-08T00:20:00Z","home_team":"Buffalo Bills","away_team":"Baltimore Ravens","bookmakers":[]}
    ]"#;

    #[test]
    fn keeps_only_configured_bookmaker_over_line() {
        let rows = parse_odds_totals(RAW, "draftkings").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].home_team, "Kansas City Chiefs");
        assert_eq!(rows[0].total_line, 45.5);
        assert_eq!(rows[0].bookmaker, "DraftKings");
        assert_eq!(rows[0].commence_time.to_rfc3339(), "2025-09-07T17:00:00+00:00");
    }

    #[test]
    fn other_bookmaker_can_be_selected() {
        let rows = parse_odds_totals(RAW, "FanDuel").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_line, 44.5);
    }
}
