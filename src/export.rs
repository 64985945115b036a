use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::evaluate::{EvaluationReport, signal};
use crate::upcoming::UpcomingPrediction;

enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Empty, Cell::Number)
    }
}

/// Writes a workbook with a Predictions sheet and an Evaluation sheet.
pub fn export_workbook(
    path: &Path,
    predictions: &[UpcomingPrediction],
    report: &EvaluationReport,
) -> Result<()> {
    let mut prediction_rows: Vec<Vec<Cell>> = vec![vec![
        "Date".into(),
        "Kickoff (UTC)".into(),
        "Home".into(),
        "Away".into(),
        "Total Line".into(),
        "Predicted Total".into(),
        "Edge".into(),
        "Signal".into(),
    ]];
    for p in predictions {
        let s = signal(p.predicted_total, p.total_line, report.margin)
            .map(|s| s.to_string())
            .unwrap_or_default();
        prediction_rows.push(vec![
            Cell::Text(p.date().format("%Y-%m-%d").to_string()),
            Cell::Text(p.kickoff.format("%Y-%m-%d %H:%M").to_string()),
            p.home_team.as_str().into(),
            p.away_team.as_str().into(),
            p.total_line.into(),
            p.predicted_total.into(),
            (p.predicted_total - p.total_line).into(),
            Cell::Text(s),
        ]);
    }

    let metrics = report.metrics;
    let mut eval_rows: Vec<Vec<Cell>> = vec![
        vec!["Metric".into(), "Value".into()],
        vec!["Training rows".into(), (report.train_rows as f64).into()],
        vec!["Test rows".into(), (report.test_rows as f64).into()],
        vec!["Dropped rows".into(), (report.dropped_rows as f64).into()],
        vec!["MAE".into(), metrics.map(|m| m.mae).into()],
        vec!["R2".into(), metrics.and_then(|m| m.r2).into()],
        vec!["Margin".into(), report.margin.into()],
        vec!["Signals issued".into(), (report.signals.issued as f64).into()],
        vec!["Signals correct".into(), (report.signals.correct as f64).into()],
        vec!["Signal precision".into(), report.signals.precision().into()],
        vec![Cell::Empty, Cell::Empty],
        vec!["Feature".into(), "Importance".into()],
    ];
    for (name, weight) in &report.importances {
        eval_rows.push(vec![name.as_str().into(), (*weight).into()]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions")?;
        write_rows(sheet, &prediction_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Evaluation")?;
        write_rows(sheet, &eval_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                Cell::Number(v) => {
                    worksheet.write_number(r, c, *v)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(())
}
