use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::forest::{ForestParams, RandomForest};

pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;
    /// One weight per input column, summing to 1 once fitted.
    fn feature_importances(&self) -> Vec<f64>;
}

/// Trained total-points model together with the column contract it was fitted
/// against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsModel {
    pub feature_names: Vec<String>,
    pub train_seasons: Vec<i32>,
    pub trained_at: DateTime<Utc>,
    forest: RandomForest,
}

impl TotalsModel {
    pub fn fit(
        feature_names: Vec<String>,
        train_seasons: Vec<i32>,
        params: ForestParams,
        x: &[Vec<f64>],
        y: &[f64],
    ) -> Result<Self> {
        let mut forest = RandomForest::new(params);
        forest.fit(x, y).context("fit random forest")?;
        Ok(Self {
            feature_names,
            train_seasons,
            trained_at: Utc::now(),
            forest,
        })
    }

    pub fn params(&self) -> &ForestParams {
        self.forest.params()
    }

    /// Predicts for rows laid out as `columns`, which must equal the training
    /// columns in name and order.
    pub fn predict(&self, columns: &[String], x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if columns != self.feature_names.as_slice() {
            return Err(PipelineError::FeatureSchemaMismatch {
                expected: self.feature_names.clone(),
                actual: columns.to_vec(),
            }
            .into());
        }
        self.forest.predict(x)
    }

    /// (column, importance) sorted by importance, largest first.
    pub fn importances(&self) -> Vec<(String, f64)> {
        let mut out = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.forest.feature_importances())
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create model dir {}", dir.display()))?;
        }
        let json = serde_json::to_string(self).context("serialize model")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::missing_input(
                path,
                "train a model first (run nfl_totals or backtest)",
            )
            .into());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("decode model {}", path.display()))
    }
}
