use anyhow::Result;
use clap::Parser;
use tracing::info;

use nfl_totals::config::PipelineConfig;
use nfl_totals::dataset::{load_inputs, retain_seasons};
use nfl_totals::evaluate::{print_report, train_and_evaluate};
use nfl_totals::export::export_workbook;
use nfl_totals::features::build_rolling_features;
use nfl_totals::forecast::{OpenWeatherForecast, load_forecasts};
use nfl_totals::predictions::{PredictionRow, save_predictions};
use nfl_totals::store::TeamGameStore;
use nfl_totals::team_games::project_team_games;
use nfl_totals::totals::{OddsApiTotals, load_totals};
use nfl_totals::upcoming::{assemble_upcoming, predict_upcoming};
use nfl_totals::weather::{OpenMeteoArchive, create_weather_features};

fn main() {
    nfl_totals::init_runtime();
    let config = PipelineConfig::parse();
    if let Err(err) = config.validate().and_then(|_| run(&config)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(config: &PipelineConfig) -> Result<()> {
    let refs = config.references()?;
    let cache = config.cache();
    let run_date = config.run_date();
    info!(%run_date, offline = config.offline, "pipeline started");

    let (mut games, mut plays) = load_inputs(&config.games_path, &config.plays_path)?;
    retain_seasons(&mut games, &mut plays, &config.seasons());
    let mut table = project_team_games(&games);
    build_rolling_features(&mut table, &plays, &config.rolling());
    create_weather_features(&mut table, &refs, &cache, &OpenMeteoArchive::default())?;

    let mut store = TeamGameStore::open(&config.store_path)?;
    store.replace_all(&table)?;

    let (model, report) = train_and_evaluate(&table, &config.train_options())?;
    model.save(&config.model_path)?;
    info!(path = %config.model_path.display(), "model saved");
    print_report(&report);

    let odds = OddsApiTotals::new(
        config.odds_api_key.clone().unwrap_or_default(),
        config.bookmaker.clone(),
    );
    let totals = load_totals(&cache, &odds, run_date)?;
    let owm = OpenWeatherForecast::new(config.weather_api_key.clone().unwrap_or_default());
    let forecasts = load_forecasts(&cache, &totals, &refs, &owm, run_date)?;

    let assembly = assemble_upcoming(&totals, &table, &forecasts, &refs)?;
    let predicted = predict_upcoming(&assembly, &model)?;

    let rows = predicted.iter().map(PredictionRow::from).collect::<Vec<_>>();
    let path = save_predictions(&config.predictions_dir, run_date, &rows)?;

    println!();
    println!("Predicted totals ({} games, {} skipped):", rows.len(), assembly.skipped.len());
    for p in &predicted {
        println!(
            "  {}  {:>3} vs {:<3}  line {:>5.1}  predicted {:>5.1}",
            p.date(),
            p.home_team,
            p.away_team,
            p.total_line,
            p.predicted_total
        );
    }
    for s in &assembly.skipped {
        println!("  skipped {} vs {}: {}", s.home_team, s.away_team, s.reason);
    }
    println!("Saved predictions to {}", path.display());

    if let Some(xlsx) = &config.xlsx {
        export_workbook(xlsx, &predicted, &report)?;
        println!("Wrote workbook {}", xlsx.display());
    }
    Ok(())
}
