use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;

use nfl_totals::predictions::{load_latest, load_predictions, week_view};

/// Print one week of predicted totals from the latest predictions file
#[derive(Parser, Debug)]
#[command(name = "weekly_report", version, about)]
struct Args {
    #[arg(long, env = "PREDICTIONS_DIR", default_value = "predictions")]
    predictions_dir: PathBuf,

    /// Read this file instead of the most recent one
    #[arg(long)]
    file: Option<PathBuf>,

    /// First day of week 1
    #[arg(long, env = "SEASON_START", default_value = "2025-09-04")]
    season_start: NaiveDate,

    /// Week to show (default: latest week in the file)
    #[arg(long)]
    week: Option<u32>,
}

fn main() -> Result<()> {
    nfl_totals::init_runtime();
    let args = Args::parse();

    let loaded = match &args.file {
        Some(path) => Some((path.clone(), load_predictions(path)?)),
        None => load_latest(&args.predictions_dir)?,
    };
    let Some((path, rows)) = loaded else {
        println!("no data for this selection");
        return Ok(());
    };

    let (week, shown) = week_view(&rows, args.season_start, args.week);
    let Some(week) = week.filter(|_| !shown.is_empty()) else {
        println!("no data for this selection");
        return Ok(());
    };

    println!("NFL predicted totals, week {week} ({})", path.display());
    println!("{:<12} {:<5} {:<5} {:>9}", "date", "home", "away", "predicted");
    for row in &shown {
        println!(
            "{:<12} {:<5} {:<5} {:>9.1}",
            row.date.format("%Y-%m-%d"),
            row.home_team,
            row.away_team,
            row.predicted_total
        );
    }
    Ok(())
}
