use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::features::{feature_names, feature_vector};
use crate::forest::ForestParams;
use crate::model::TotalsModel;
use crate::team_games::{Stage, TeamGameTable};

pub const DEFAULT_MARGIN: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Over,
    Under,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Over => f.write_str("Over"),
            Signal::Under => f.write_str("Under"),
        }
    }
}

impl Signal {
    /// A push (actual equal to the line) is never correct.
    pub fn is_correct(self, actual: f64, line: f64) -> bool {
        match self {
            Signal::Over => actual > line,
            Signal::Under => actual < line,
        }
    }
}

/// Over when the prediction clears the line by more than `margin`, Under when
/// it falls short by more than `margin`, nothing inside the band.
pub fn signal(predicted: f64, line: f64, margin: f64) -> Option<Signal> {
    if predicted > line + margin {
        Some(Signal::Over)
    } else if predicted < line - margin {
        Some(Signal::Under)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTally {
    pub issued: usize,
    pub correct: usize,
}

impl SignalTally {
    /// Undefined when no signal was issued.
    pub fn precision(&self) -> Option<f64> {
        (self.issued > 0).then(|| self.correct as f64 / self.issued as f64)
    }
}

/// Tallies signals over (predicted, line, actual) triples.
pub fn signal_precision(rows: &[(f64, f64, f64)], margin: f64) -> SignalTally {
    let mut tally = SignalTally::default();
    for (predicted, line, actual) in rows {
        let Some(s) = signal(*predicted, *line, margin) else {
            continue;
        };
        tally.issued += 1;
        if s.is_correct(*actual, *line) {
            tally.correct += 1;
        }
    }
    tally
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub samples: usize,
    pub mae: f64,
    /// Undefined when the targets have no variance.
    pub r2: Option<f64>,
}

pub fn regression_metrics(predicted: &[f64], actual: &[f64]) -> Option<Metrics> {
    if predicted.is_empty() || predicted.len() != actual.len() {
        return None;
    }
    let n = actual.len() as f64;
    let mae = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / n;
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot = actual.iter().map(|a| (a - mean).powi(2)).sum::<f64>();
    let ss_res = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (a - p).powi(2))
        .sum::<f64>();
    let r2 = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);
    Some(Metrics {
        samples: actual.len(),
        mae,
        r2,
    })
}

/// One game from the home perspective with a complete feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub game_id: String,
    pub season: i32,
    pub total_line: f64,
    pub total_points: f64,
    pub features: Vec<f64>,
}

/// Home rows with every feature and the final total defined. Returns the rows
/// and the number of played games that were dropped for undefined features.
pub fn training_rows(table: &TeamGameTable) -> Result<(Vec<TrainingRow>, usize)> {
    table.require(&Stage::ALL)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for row in table.home_rows() {
        let Some(total_points) = row.total_points else {
            continue;
        };
        match feature_vector(row.total_line, &row.matchup) {
            Ok(features) => rows.push(TrainingRow {
                game_id: row.game_id.clone(),
                season: row.season,
                total_line: features[0],
                total_points: f64::from(total_points),
                features,
            }),
            Err(_) => dropped += 1,
        }
    }
    rows.sort_by(|a, b| a.season.cmp(&b.season).then(a.game_id.cmp(&b.game_id)));
    Ok((rows, dropped))
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub train_seasons: Vec<i32>,
    pub test_seasons: Vec<i32>,
    pub margin: f64,
    pub forest: ForestParams,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            train_seasons: vec![2021, 2022, 2023],
            test_seasons: vec![2024],
            margin: DEFAULT_MARGIN,
            forest: ForestParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
    /// None when the test seasons have no complete rows.
    pub metrics: Option<Metrics>,
    pub margin: f64,
    pub signals: SignalTally,
    pub importances: Vec<(String, f64)>,
}

/// Fits on the training seasons and scores the held-out seasons. The caller
/// decides where the returned model is saved.
pub fn train_and_evaluate(
    table: &TeamGameTable,
    opts: &TrainOptions,
) -> Result<(TotalsModel, EvaluationReport)> {
    let (rows, dropped_rows) = training_rows(table)?;
    if dropped_rows > 0 {
        warn!(dropped_rows, "played games dropped for undefined features");
    }

    let (train, test): (Vec<&TrainingRow>, Vec<&TrainingRow>) = rows
        .iter()
        .filter(|r| opts.train_seasons.contains(&r.season) || opts.test_seasons.contains(&r.season))
        .partition(|r| opts.train_seasons.contains(&r.season));
    if train.is_empty() {
        return Err(PipelineError::NoTrainingRows {
            seasons: opts.train_seasons.clone(),
        }
        .into());
    }

    let x = train.iter().map(|r| r.features.clone()).collect::<Vec<_>>();
    let y = train.iter().map(|r| r.total_points).collect::<Vec<_>>();
    let model = TotalsModel::fit(feature_names(), opts.train_seasons.clone(), opts.forest, &x, &y)?;
    info!(rows = train.len(), trees = opts.forest.n_trees, "model trained");

    let mut metrics = None;
    let mut signals = SignalTally::default();
    if !test.is_empty() {
        let x_test = test.iter().map(|r| r.features.clone()).collect::<Vec<_>>();
        let actual = test.iter().map(|r| r.total_points).collect::<Vec<_>>();
        let predicted = model.predict(&feature_names(), &x_test)?;
        metrics = regression_metrics(&predicted, &actual);

        let triples = test
            .iter()
            .zip(&predicted)
            .map(|(r, p)| (*p, r.total_line, r.total_points))
            .collect::<Vec<_>>();
        signals = signal_precision(&triples, opts.margin);
    } else {
        warn!(seasons = ?opts.test_seasons, "no complete rows in test seasons, evaluation skipped");
    }

    let report = EvaluationReport {
        train_rows: train.len(),
        test_rows: test.len(),
        dropped_rows,
        metrics,
        margin: opts.margin,
        signals,
        importances: model.importances(),
    };
    Ok((model, report))
}

pub fn print_report(report: &EvaluationReport) {
    println!(
        "Training rows: {}  Test rows: {}  Dropped: {}",
        report.train_rows, report.test_rows, report.dropped_rows
    );
    match report.metrics {
        Some(m) => {
            println!("Mean Absolute Error: {:.2} points", m.mae);
            match m.r2 {
                Some(r2) => println!("R-squared: {r2:.3}"),
                None => println!("R-squared: n/a"),
            }
        }
        None => println!("No test rows to evaluate."),
    }
    println!(
        "Signals issued (margin {:.1}): {}  correct: {}",
        report.margin, report.signals.issued, report.signals.correct
    );
    match report.signals.precision() {
        Some(p) => println!("Signal precision: {:.1}%", p * 100.0),
        None => println!("Signal precision: n/a (no signals issued)"),
    }
    println!("Feature importances:");
    for (name, weight) in &report.importances {
        println!("  {name:<34} {weight:.4}");
    }
}
