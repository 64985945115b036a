pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod features;
pub mod forecast;
pub mod forest;
pub mod http_client;
pub mod model;
pub mod predictions;
pub mod reference;
pub mod store;
pub mod team_games;
pub mod totals;
pub mod upcoming;
pub mod weather;

/// Loads `.env.local` then `.env` and installs the `fmt` subscriber
/// (`RUST_LOG`, default `info`). Called once at the top of every binary.
pub fn init_runtime() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
