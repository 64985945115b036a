use std::ops::RangeInclusive;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Parser;

use crate::cache::FileCache;
use crate::evaluate::TrainOptions;
use crate::features::RollingWindow;
use crate::forest::ForestParams;
use crate::reference::ReferenceData;

/// NFL total-points pipeline: features, training and next-slate predictions
#[derive(Parser, Debug, Clone)]
#[command(name = "nfl_totals", version, about)]
pub struct PipelineConfig {
    /// Schedule parquet (one row per game)
    #[arg(long, env = "GAMES_PATH", default_value = "data/games.parquet")]
    pub games_path: PathBuf,

    /// Play-by-play parquet file, or a directory of per-season parquet files
    #[arg(long, env = "PLAYS_PATH", default_value = "data/plays")]
    pub plays_path: PathBuf,

    /// Directory for cached external responses
    #[arg(long, env = "CACHE_DIR", default_value = "data/cache")]
    pub cache_dir: PathBuf,

    /// Where dated prediction files are written
    #[arg(long, env = "PREDICTIONS_DIR", default_value = "predictions")]
    pub predictions_dir: PathBuf,

    /// Trained model artifact
    #[arg(long, env = "MODEL_PATH", default_value = "model/total_points_model.json")]
    pub model_path: PathBuf,

    /// SQLite store for the featured team-game table
    #[arg(long, env = "STORE_PATH", default_value = "data/team_games.sqlite")]
    pub store_path: PathBuf,

    /// JSON file overriding the built-in team, stadium and dome tables
    #[arg(long, env = "REFERENCE_DATA")]
    pub reference_path: Option<PathBuf>,

    /// First season read from the schedule and play-by-play inputs
    #[arg(long, env = "FIRST_SEASON", default_value = "2021")]
    pub first_season: i32,

    /// Last season read from the inputs
    #[arg(long, env = "LAST_SEASON", default_value = "2024")]
    pub last_season: i32,

    #[arg(long, env = "TRAIN_SEASONS", value_delimiter = ',', default_value = "2021,2022,2023")]
    pub train_seasons: Vec<i32>,

    #[arg(long, env = "TEST_SEASONS", value_delimiter = ',', default_value = "2024")]
    pub test_seasons: Vec<i32>,

    /// Points the prediction must clear the line by before a signal is issued
    #[arg(long, env = "SIGNAL_MARGIN", default_value = "3.5")]
    pub margin: f64,

    #[arg(long, env = "FOREST_TREES", default_value = "500")]
    pub trees: usize,

    #[arg(long, env = "FOREST_SEED", default_value = "42")]
    pub seed: u64,

    /// Number of prior games in each rolling average
    #[arg(long, env = "ROLLING_WINDOW", default_value = "5")]
    pub rolling_window: usize,

    #[arg(long, env = "BOOKMAKER", default_value = "draftkings")]
    pub bookmaker: String,

    /// the-odds-api key
    #[arg(long, env = "API_KEY_TOTALS", hide_env_values = true)]
    pub odds_api_key: Option<String>,

    /// OpenWeatherMap key
    #[arg(long, env = "API_KEY_WEATHER", hide_env_values = true)]
    pub weather_api_key: Option<String>,

    /// Also write an xlsx workbook with predictions and evaluation
    #[arg(long, env = "XLSX_PATH")]
    pub xlsx: Option<PathBuf>,

    /// Serve every external lookup from the cache; a miss is an error
    #[arg(long, env = "OFFLINE", default_value = "false")]
    pub offline: bool,

    /// Date used for cache keys and the output file name (default: today, UTC)
    #[arg(long, env = "RUN_DATE")]
    pub run_date: Option<NaiveDate>,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.margin > 0.0 && self.margin.is_finite()) {
            anyhow::bail!("margin must be a positive number of points");
        }
        if self.rolling_window == 0 {
            anyhow::bail!("rolling_window must be at least 1");
        }
        if self.trees == 0 {
            anyhow::bail!("trees must be at least 1");
        }
        if self.first_season > self.last_season {
            anyhow::bail!(
                "first season {} is after last season {}",
                self.first_season,
                self.last_season
            );
        }
        if self.train_seasons.is_empty() {
            anyhow::bail!("at least one training season is required");
        }
        if let Some(season) = self
            .train_seasons
            .iter()
            .find(|s| self.test_seasons.contains(s))
        {
            anyhow::bail!("season {season} is in both train and test seasons");
        }
        let seasons = self.seasons();
        if let Some(season) = self
            .train_seasons
            .iter()
            .chain(&self.test_seasons)
            .find(|s| !seasons.contains(s))
        {
            anyhow::bail!(
                "season {season} is outside the loaded range {}-{}",
                self.first_season,
                self.last_season
            );
        }
        if !self.offline {
            if self.odds_api_key.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("API_KEY_TOTALS is required unless --offline is set");
            }
            if self.weather_api_key.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("API_KEY_WEATHER is required unless --offline is set");
            }
        }
        Ok(())
    }

    pub fn seasons(&self) -> RangeInclusive<i32> {
        self.first_season..=self.last_season
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn rolling(&self) -> RollingWindow {
        RollingWindow::with_size(self.rolling_window)
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            train_seasons: self.train_seasons.clone(),
            test_seasons: self.test_seasons.clone(),
            margin: self.margin,
            forest: ForestParams {
                n_trees: self.trees,
                seed: self.seed,
                ..ForestParams::default()
            },
        }
    }

    pub fn cache(&self) -> FileCache {
        if self.offline {
            FileCache::offline(&self.cache_dir)
        } else {
            FileCache::new(&self.cache_dir)
        }
    }

    pub fn references(&self) -> Result<ReferenceData> {
        match &self.reference_path {
            Some(path) => ReferenceData::from_json_file(path),
            None => Ok(ReferenceData::nfl()),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::PipelineConfig;

    fn parse(args: &[&str]) -> PipelineConfig {
        let mut argv = vec!["nfl_totals", "--offline"];
        argv.extend_from_slice(args);
        PipelineConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid_offline() {
        let cfg = parse(&[]);
        assert_eq!(cfg.train_seasons, vec![2021, 2022, 2023]);
        assert_eq!(cfg.test_seasons, vec![2024]);
        assert_eq!(cfg.seasons(), 2021..=2024);
        assert_eq!(cfg.rolling().size, 5);
        assert_eq!(cfg.train_options().forest.n_trees, 500);
        cfg.validate().unwrap();
    }

    #[test]
    fn overlapping_seasons_are_rejected() {
        let cfg = parse(&["--train-seasons", "2022,2023", "--test-seasons", "2023"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn season_range_must_cover_train_and_test() {
        assert!(parse(&["--first-season", "2022"]).validate().is_err());
        assert!(parse(&["--first-season", "2025", "--last-season", "2024"]).validate().is_err());
        let cfg = parse(&["--last-season", "2025"]);
        assert_eq!(cfg.seasons(), 2021..=2025);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_window_and_negative_margin_are_rejected() {
        assert!(parse(&["--rolling-window", "0"]).validate().is_err());
        assert!(parse(&["--margin=-1"]).validate().is_err());
    }
}
