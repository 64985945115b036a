use std::path::PathBuf;

use thiserror::Error;

/// Conditions that stop the whole run. Row-level data gaps are not errors;
/// they surface as [`crate::upcoming::SkipReason`] entries instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required input missing: {path} ({hint})")]
    MissingInput { path: PathBuf, hint: String },

    #[error("team name {name:?} has no short-code mapping")]
    UnmappedTeam { name: String },

    #[error("{source_name} fetch failed: {message}")]
    ExternalFetch {
        source_name: &'static str,
        message: String,
    },

    #[error("feature schema mismatch: model expects {expected:?}, got {actual:?}")]
    FeatureSchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("no complete rows available for training seasons {seasons:?}")]
    NoTrainingRows { seasons: Vec<i32> },
}

impl PipelineError {
    pub fn missing_input(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        Self::MissingInput {
            path: path.into(),
            hint: hint.into(),
        }
    }

    pub fn fetch(source_name: &'static str, err: impl std::fmt::Display) -> Self {
        Self::ExternalFetch {
            source_name,
            message: err.to_string(),
        }
    }
}
