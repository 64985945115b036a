//! Dated prediction files.
//!
//! Every run writes `predictions_YYYYMMDD.csv`; a second run on the same day
//! gets `_v2`, then `_v3`, and so on. An existing file is never overwritten.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::upcoming::UpcomingPrediction;

pub const CSV_HEADER: &str = "date,home_team,away_team,predicted_total";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub predicted_total: f64,
}

impl From<&UpcomingPrediction> for PredictionRow {
    fn from(p: &UpcomingPrediction) -> Self {
        Self {
            date: p.date(),
            home_team: p.home_team.clone(),
            away_team: p.away_team.clone(),
            predicted_total: p.predicted_total,
        }
    }
}

/// First free path among `predictions_YYYYMMDD.csv`, `_v2`, `_v3`, ...
pub fn versioned_path(dir: &Path, run_date: NaiveDate) -> PathBuf {
    let stem = format!("predictions_{}", run_date.format("%Y%m%d"));
    let base = dir.join(format!("{stem}.csv"));
    if !base.exists() {
        return base;
    }
    let mut version = 2u32;
    loop {
        let candidate = dir.join(format!("{stem}_v{version}.csv"));
        if !candidate.exists() {
            return candidate;
        }
        version += 1;
    }
}

pub fn to_csv(rows: &[PredictionRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            row.date.format("%Y-%m-%d"),
            row.home_team,
            row.away_team,
            row.predicted_total
        ));
    }
    out
}

/// Writes `rows` to the next free versioned path and returns it.
pub fn save_predictions(dir: &Path, run_date: NaiveDate, rows: &[PredictionRow]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = versioned_path(dir, run_date);
    let tmp = path.with_extension("csv.tmp");
    fs::write(&tmp, to_csv(rows)).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(path)
}

pub fn parse_csv(raw: &str) -> Result<Vec<PredictionRow>> {
    let mut lines = raw.lines();
    let header = lines.next().unwrap_or_default().trim();
    if header != CSV_HEADER {
        return Err(anyhow!("unexpected predictions header: {header:?}"));
    }

    let mut out = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = line.split(',').collect::<Vec<_>>();
        let [date, home, away, total] = fields.as_slice() else {
            return Err(anyhow!("line {}: expected 4 fields, got {}", n + 2, fields.len()));
        };
        out.push(PredictionRow {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("line {}: bad date {date:?}", n + 2))?,
            home_team: home.to_string(),
            away_team: away.to_string(),
            predicted_total: total
                .parse()
                .with_context(|| format!("line {}: bad predicted_total {total:?}", n + 2))?,
        });
    }
    Ok(out)
}

pub fn load_predictions(path: &Path) -> Result<Vec<PredictionRow>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_csv(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Most recently modified prediction file in `dir`, if any.
pub fn latest_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry?.path();
        let is_prediction = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("predictions_") && n.ends_with(".csv"));
        if !is_prediction {
            continue;
        }
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = match &best {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

pub fn load_latest(dir: &Path) -> Result<Option<(PathBuf, Vec<PredictionRow>)>> {
    let Some(path) = latest_file(dir)? else {
        return Ok(None);
    };
    let rows = load_predictions(&path)?;
    Ok(Some((path, rows)))
}

/// Week of the season `date` falls in, counting from `season_start`. Dates
/// before the opener count as week 1.
pub fn season_week(date: NaiveDate, season_start: NaiveDate) -> u32 {
    let days = (date - season_start).num_days();
    let week = days.div_euclid(7) + 1;
    u32::try_from(week.max(1)).unwrap_or(1)
}

/// Rows of one season week, sorted by date then home team. With no `week`
/// the latest week present is used. Returns the week shown.
pub fn week_view(
    rows: &[PredictionRow],
    season_start: NaiveDate,
    week: Option<u32>,
) -> (Option<u32>, Vec<PredictionRow>) {
    let week = week.or_else(|| rows.iter().map(|r| season_week(r.date, season_start)).max());
    let Some(week) = week else {
        return (None, Vec::new());
    };
    let mut out = rows
        .iter()
        .filter(|r| season_week(r.date, season_start) == week)
        .cloned()
        .collect::<Vec<_>>();
    out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.home_team.cmp(&b.home_team)));
    (Some(week), out)
}
