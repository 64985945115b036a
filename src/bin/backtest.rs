use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nfl_totals::evaluate::{TrainOptions, print_report, train_and_evaluate};
use nfl_totals::forest::ForestParams;
use nfl_totals::store::TeamGameStore;

/// Retrain and score the model from the stored team-game table, without
/// touching the raw data or the network
#[derive(Parser, Debug)]
#[command(name = "backtest", version, about)]
struct Args {
    #[arg(long, env = "STORE_PATH", default_value = "data/team_games.sqlite")]
    store_path: PathBuf,

    #[arg(long, value_delimiter = ',', default_value = "2021,2022,2023")]
    train_seasons: Vec<i32>,

    #[arg(long, value_delimiter = ',', default_value = "2024")]
    test_seasons: Vec<i32>,

    #[arg(long, default_value = "3.5")]
    margin: f64,

    #[arg(long, default_value = "500")]
    trees: usize,

    #[arg(long, default_value = "42")]
    seed: u64,

    #[arg(long)]
    max_depth: Option<usize>,

    /// Save the retrained model here
    #[arg(long)]
    model_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    nfl_totals::init_runtime();
    let args = Args::parse();

    if !args.store_path.exists() {
        return Err(nfl_totals::error::PipelineError::missing_input(
            &args.store_path,
            "run nfl_totals once to build the store",
        )
        .into());
    }
    let store = TeamGameStore::open(&args.store_path)?;
    let table = store.load_all().context("load stored team games")?;
    let saved_at = store.saved_at()?.unwrap_or_else(|| "unknown".to_string());
    println!(
        "Loaded {} team-game rows from {} (saved {saved_at})",
        table.len(),
        args.store_path.display()
    );

    let opts = TrainOptions {
        train_seasons: args.train_seasons.clone(),
        test_seasons: args.test_seasons.clone(),
        margin: args.margin,
        forest: ForestParams {
            n_trees: args.trees.max(1),
            max_depth: args.max_depth,
            seed: args.seed,
            ..ForestParams::default()
        },
    };
    let (model, report) = train_and_evaluate(&table, &opts)?;
    print_report(&report);

    if let Some(path) = &args.model_out {
        model.save(path)?;
        println!("Saved model to {}", path.display());
    }
    Ok(())
}
