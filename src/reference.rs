//! Static lookup tables shared by the pipeline stages.
//!
//! Nothing here is global: stages take a `&ReferenceData` so tests can pass a
//! trimmed fixture table instead of the full league.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Full franchise name (as the odds feed spells it) to short code.
    pub team_codes: BTreeMap<String, String>,
    /// Short code to home stadium coordinates.
    pub stadiums: BTreeMap<String, Coords>,
    /// Short codes of teams with an enclosed home venue.
    pub dome_teams: BTreeSet<String>,
}

const NFL_TEAMS: &[(&str, &str, f64, f64)] = &[
    ("Arizona Cardinals", "ARI", 33.5275, -112.2625),
    ("Atlanta Falcons", "ATL", 33.755, -84.4008),
    ("Baltimore Ravens", "BAL", 39.2779, -76.6227),
    ("Buffalo Bills", "BUF", 42.7738, -78.7865),
    ("Carolina Panthers", "CAR", 35.2251, -80.8529),
    ("Chicago Bears", "CHI", 41.8623, -87.6167),
    ("Cincinnati Bengals", "CIN", 39.0955, -84.5161),
    ("Cleveland Browns", "CLE", 41.5061, -81.6995),
    ("Dallas Cowboys", "DAL", 32.7473, -97.0945),
    ("Denver Broncos", "DEN", 39.7439, -105.0201),
    ("Detroit Lions", "DET", 42.3400, -83.0456),
    ("Green Bay Packers", "GB", 44.5013, -88.0622),
    ("Houston Texans", "HOU", 29.6847, -95.4107),
    ("Indianapolis Colts", "IND", 39.7640, -86.1639),
    ("Jacksonville Jaguars", "JAX", 30.3240, -81.6375),
    ("Kansas City Chiefs", "KC", 39.0489, -94.4839),
    ("Las Vegas Raiders", "LV", 36.0908, -115.1830),
    ("Los Angeles Chargers", "LAC", 33.9535, -118.3392),
    ("Los Angeles Rams", "LA", 34.0141, -118.2872),
    ("Miami Dolphins", "MIA", 25.9580, -80.2389),
    ("Minnesota Vikings", "MIN", 44.9733, -93.2572),
    ("New England Patriots", "NE", 42.0909, -71.2643),
    ("New Orleans Saints", "NO", 29.9511, -90.0812),
    ("New York Giants", "NYG", 40.8135, -74.0744),
    ("New York Jets", "NYJ", 40.8135, -74.0744),
    ("Philadelphia Eagles", "PHI", 39.9008, -75.1675),
    ("Pittsburgh Steelers", "PIT", 40.4469, -80.0158),
    ("Seattle Seahawks", "SEA", 47.5952, -122.3316),
    ("San Francisco 49ers", "SF", 37.4030, -121.9700),
    ("Tampa Bay Buccaneers", "TB", 27.9759, -82.5033),
    ("Tennessee Titans", "TEN", 36.1662, -86.7713),
    ("Washington Commanders", "WAS", 38.9076, -77.0209),
];

const NFL_DOMES: &[&str] = &[
    "ARI", "ATL", "DAL", "DET", "HOU", "IND", "LV", "LAC", "LA", "MIN", "NO",
];

impl ReferenceData {
    pub fn nfl() -> Self {
        let mut out = Self::default();
        for (name, code, lat, lon) in NFL_TEAMS {
            out.team_codes.insert(name.to_string(), code.to_string());
            out.stadiums
                .insert(code.to_string(), Coords { lat: *lat, lon: *lon });
        }
        out.dome_teams = NFL_DOMES.iter().map(|c| c.to_string()).collect();
        out
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read reference data {}", path.display()))?;
        serde_json::from_str(&raw).context("invalid reference data json")
    }

    /// Maps a full team name to its short code. Unknown names are fatal.
    pub fn team_code(&self, name: &str) -> Result<&str, PipelineError> {
        self.team_codes
            .get(name.trim())
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnmappedTeam {
                name: name.to_string(),
            })
    }

    pub fn is_dome(&self, code: &str) -> bool {
        self.dome_teams.contains(code)
    }

    pub fn stadium(&self, code: &str) -> Option<Coords> {
        self.stadiums.get(code).copied()
    }
}
