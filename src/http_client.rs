use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("nfl-totals/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared blocking client. Every external call in a run goes through it,
/// sequentially.
pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// GET `url` with query params and return the body, turning non-2xx into an
/// error that carries a short body snippet.
pub fn get_text(url: &str, query: &[(&str, &str)]) -> Result<String> {
    let client = http_client()?;
    let resp = client
        .get(url)
        .query(query)
        .send()
        .with_context(|| format!("request to {url} failed"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        let snippet = body
            .trim()
            .replace(['\n', '\r'], " ")
            .chars()
            .take(220)
            .collect::<String>();
        return Err(anyhow::anyhow!("http {}: {}", status, snippet));
    }
    Ok(body)
}
