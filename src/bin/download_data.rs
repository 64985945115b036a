use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

const NFLVERSE_RELEASES: &str = "https://github.com/nflverse/nflverse-data/releases/download";

/// Download the nflverse schedule and per-season play-by-play parquet files
#[derive(Parser, Debug)]
#[command(name = "download_data", version, about)]
struct Args {
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "2021")]
    first_season: i32,

    #[arg(long, default_value = "2024")]
    last_season: i32,

    #[arg(long, env = "NFLVERSE_BASE_URL", default_value = NFLVERSE_RELEASES)]
    base_url: String,

    /// Download again even when the file already exists
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    nfl_totals::init_runtime();
    let args = Args::parse();
    if args.first_season > args.last_season {
        return Err(anyhow!(
            "first season {} is after last season {}",
            args.first_season,
            args.last_season
        ));
    }

    let plays_dir = args.data_dir.join("plays");
    fs::create_dir_all(&plays_dir)
        .with_context(|| format!("create {}", plays_dir.display()))?;

    let base = args.base_url.trim_end_matches('/');
    let mut targets = vec![(
        format!("{base}/schedules/games.parquet"),
        args.data_dir.join("games.parquet"),
    )];
    for season in args.first_season..=args.last_season {
        targets.push((
            format!("{base}/pbp/play_by_play_{season}.parquet"),
            plays_dir.join(format!("play_by_play_{season}.parquet")),
        ));
    }

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("nfl-totals/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(180))
        .build()
        .context("build http client")?;

    let mut downloaded = 0usize;
    for (url, path) in &targets {
        if path.exists() && !args.force {
            info!(path = %path.display(), "already present, skipping");
            continue;
        }
        download_file(&client, url, path)?;
        downloaded += 1;
    }

    println!(
        "Data ready in {} ({} downloaded, {} already present)",
        args.data_dir.display(),
        downloaded,
        targets.len() - downloaded
    );
    Ok(())
}

fn download_file(client: &reqwest::blocking::Client, url: &str, path: &Path) -> Result<()> {
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=4 {
        let fetched = client
            .get(url)
            .send()
            .with_context(|| format!("request {url}"))
            .and_then(|res| {
                res.error_for_status()
                    .with_context(|| format!("status for {url}"))
            })
            .and_then(|res| res.bytes().with_context(|| format!("read body {url}")));
        match fetched {
            Ok(bytes) => {
                let tmp = path.with_extension("parquet.part");
                fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
                fs::rename(&tmp, path)
                    .with_context(|| format!("rename into {}", path.display()))?;
                info!(url, bytes = bytes.len(), path = %path.display(), "downloaded");
                return Ok(());
            }
            Err(err) => {
                warn!(url, attempt, error = %format!("{err:#}"), "download attempt failed");
                last_err = Some(err);
                if attempt < 4 {
                    let sleep_ms = 500_u64.saturating_mul(attempt as u64);
                    std::thread::sleep(Duration::from_millis(sleep_ms));
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("download failed for {url}")))
}
