use std::collections::HashSet;
use std::fs::{self, File};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row, RowAccessor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;

/// One scheduled contest. Upcoming games carry no scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub season: i32,
    pub week: i32,
    pub gameday: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub total_line: Option<f64>,
}

impl GameRecord {
    pub fn is_played(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }
}

/// One snap from the play-by-play feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub game_id: String,
    pub posteam: Option<String>,
    pub defteam: Option<String>,
    pub play_id: f64,
    pub passer_player_name: Option<String>,
    pub rusher_player_name: Option<String>,
    pub qb_dropback: bool,
    pub epa: Option<f64>,
    pub play_type: Option<String>,
}

const GAME_COLUMNS: [&str; 9] = [
    "game_id",
    "season",
    "week",
    "gameday",
    "home_team",
    "away_team",
    "home_score",
    "away_score",
    "total_line",
];

const PLAY_COLUMNS: [&str; 9] = [
    "game_id",
    "posteam",
    "defteam",
    "play_id",
    "passer_player_name",
    "rusher_player_name",
    "qb_dropback",
    "epa",
    "play_type",
];

/// Checks both inputs exist before reading either, so a half-downloaded data
/// directory fails before any work is done.
pub fn load_inputs(
    games_path: &Path,
    plays_path: &Path,
) -> Result<(Vec<GameRecord>, Vec<PlayRecord>)> {
    for path in [games_path, plays_path] {
        if !path.exists() {
            return Err(PipelineError::missing_input(
                path,
                "run the download_data binary first",
            )
            .into());
        }
    }

    info!("reading cached historical game-level data from {}", games_path.display());
    let games = load_games(games_path)?;
    info!("reading cached historical play-level data from {}", plays_path.display());
    let plays = load_plays(plays_path)?;
    info!(games = games.len(), plays = plays.len(), "historical data loaded");
    Ok((games, plays))
}

/// Keeps the games of `seasons` and the plays that belong to them. The
/// nflverse schedule spans every season since 1999, including franchises
/// that have since moved. Returns how many games were dropped.
pub fn retain_seasons(
    games: &mut Vec<GameRecord>,
    plays: &mut Vec<PlayRecord>,
    seasons: &RangeInclusive<i32>,
) -> usize {
    let before = games.len();
    games.retain(|g| seasons.contains(&g.season));
    let kept = games.iter().map(|g| g.game_id.as_str()).collect::<HashSet<_>>();
    plays.retain(|p| kept.contains(p.game_id.as_str()));
    let dropped = before - games.len();
    info!(
        first = seasons.start(),
        last = seasons.end(),
        games = games.len(),
        plays = plays.len(),
        dropped,
        "inputs limited to season range"
    );
    dropped
}

pub fn load_games(path: &Path) -> Result<Vec<GameRecord>> {
    let mut out = Vec::new();
    let mut skipped = 0usize;
    read_parquet_rows(path, &GAME_COLUMNS, |row, idx| {
        match parse_game_row(row, idx) {
            Some(game) => out.push(game),
            None => skipped += 1,
        }
    })?;
    if skipped > 0 {
        warn!(skipped, "schedule rows without id, teams or date were ignored");
    }
    Ok(out)
}

/// `path` may be one parquet file or a directory holding one file per season.
pub fn load_plays(path: &Path) -> Result<Vec<PlayRecord>> {
    let mut out = Vec::new();
    for file in parquet_files(path)? {
        read_parquet_rows(&file, &PLAY_COLUMNS, |row, idx| {
            if let Some(play) = parse_play_row(row, idx) {
                out.push(play);
            }
        })?;
    }
    Ok(out)
}

fn parquet_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path, "play-by-play data not found").into());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = fs::read_dir(path)
        .with_context(|| format!("list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .collect::<Vec<_>>();
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::missing_input(path, "no .parquet files in directory").into());
    }
    Ok(files)
}

fn read_parquet_rows(
    path: &Path,
    columns: &[&str],
    mut on_row: impl FnMut(&Row, &[usize]),
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file)
        .with_context(|| format!("open parquet reader {}", path.display()))?;

    let fields = reader.metadata().file_metadata().schema().get_fields();
    let mut idx = Vec::with_capacity(columns.len());
    for name in columns {
        let pos = fields
            .iter()
            .position(|f| f.name() == *name)
            .ok_or_else(|| anyhow!("column {name} missing from {}", path.display()))?;
        idx.push(pos);
    }

    let iter = reader
        .get_row_iter(None)
        .with_context(|| format!("iterate rows of {}", path.display()))?;
    for row in iter {
        let Ok(row) = row else {
            continue;
        };
        on_row(&row, &idx);
    }
    Ok(())
}

fn parse_game_row(row: &Row, idx: &[usize]) -> Option<GameRecord> {
    let game_id = read_string(row, idx[0])?;
    let home_team = read_string(row, idx[4])?;
    let away_team = read_string(row, idx[5])?;
    Some(GameRecord {
        game_id,
        season: read_f64(row, idx[1])? as i32,
        week: read_f64(row, idx[2])? as i32,
        gameday: read_date(row, idx[3])?,
        home_team,
        away_team,
        home_score: read_f64(row, idx[6]).map(|v| v as i32),
        away_score: read_f64(row, idx[7]).map(|v| v as i32),
        total_line: read_f64(row, idx[8]),
    })
}

fn parse_play_row(row: &Row, idx: &[usize]) -> Option<PlayRecord> {
    Some(PlayRecord {
        game_id: read_string(row, idx[0])?,
        posteam: read_string(row, idx[1]),
        defteam: read_string(row, idx[2]),
        play_id: read_f64(row, idx[3])?,
        passer_player_name: read_string(row, idx[4]),
        rusher_player_name: read_string(row, idx[5]),
        qb_dropback: read_f64(row, idx[6]).is_some_and(|v| v == 1.0),
        epa: read_f64(row, idx[7]).filter(|v| v.is_finite()),
        play_type: read_string(row, idx[8]),
    })
}

fn read_string(row: &Row, i: usize) -> Option<String> {
    let s = row.get_string(i).ok()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_f64(row: &Row, i: usize) -> Option<f64> {
    if let Ok(v) = row.get_double(i) {
        return Some(v);
    }
    if let Ok(v) = row.get_float(i) {
        return Some(v as f64);
    }
    if let Ok(v) = row.get_long(i) {
        return Some(v as f64);
    }
    if let Ok(v) = row.get_int(i) {
        return Some(v as f64);
    }
    None
}

fn read_date(row: &Row, i: usize) -> Option<NaiveDate> {
    if let Some(raw) = read_string(row, i) {
        return parse_gameday(&raw);
    }
    match row.get_column_iter().nth(i) {
        Some((_, Field::Date(days))) => date_from_epoch_days(*days),
        _ => None,
    }
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn parse_gameday(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::{
        GameRecord, PlayRecord, date_from_epoch_days, load_inputs, parse_gameday, retain_seasons,
    };
    use crate::error::PipelineError;
    use chrono::NaiveDate;

    #[test]
    fn parse_gameday_accepts_date_and_timestamp_prefixes() {
        let d = NaiveDate::from_ymd_opt(2023, 9, 7).unwrap();
        assert_eq!(parse_gameday("2023-09-07"), Some(d));
        assert_eq!(parse_gameday("2023-09-07T20:20:00Z"), Some(d));
        assert_eq!(parse_gameday("09/07/2023"), None);
    }

    #[test]
    fn date32_days_count_from_the_unix_epoch() {
        assert_eq!(date_from_epoch_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(date_from_epoch_days(19_975), NaiveDate::from_ymd_opt(2024, 9, 9));
        assert_eq!(date_from_epoch_days(i32::MAX), None);
    }

    #[test]
    fn season_range_drops_old_games_and_their_plays() {
        let game = |id: &str, season: i32, home: &str| GameRecord {
            game_id: id.to_string(),
            season,
            week: 1,
            gameday: NaiveDate::from_ymd_opt(season, 9, 10).unwrap(),
            home_team: home.to_string(),
            away_team: "DEN".to_string(),
            home_score: Some(20),
            away_score: Some(17),
            total_line: Some(44.0),
        };
        let play = |id: &str| PlayRecord {
            game_id: id.to_string(),
            posteam: Some("DEN".to_string()),
            defteam: None,
            play_id: 1.0,
            passer_player_name: None,
            rusher_player_name: None,
            qb_dropback: false,
            epa: Some(0.1),
            play_type: Some("run".to_string()),
        };
        let mut games = vec![
            game("2019_01_DEN_OAK", 2019, "OAK"),
            game("2021_01_DEN_KC", 2021, "KC"),
            game("2025_01_DEN_LV", 2025, "LV"),
        ];
        let mut plays = vec![play("2019_01_DEN_OAK"), play("2021_01_DEN_KC"), play("2025_01_DEN_LV")];

        assert_eq!(retain_seasons(&mut games, &mut plays, &(2021..=2024)), 2);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home_team, "KC");
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].game_id, "2021_01_DEN_KC");
    }

    #[test]
    fn missing_files_abort_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_inputs(&dir.path().join("games.parquet"), dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput { .. })
        ));
    }

    #[test]
    fn unplayed_game_is_not_played() {
        let game = GameRecord {
            game_id: "2025_01_DAL_PHI".to_string(),
            season: 2025,
            week: 1,
            gameday: NaiveDate::from_ymd_opt(2025, 9, 4).unwrap(),
            home_team: "PHI".to_string(),
            away_team: "DAL".to_string(),
            home_score: None,
            away_score: None,
            total_line: Some(47.5),
        };
        assert!(!game.is_played());
    }
}
