// src/fetch/mod.rs

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub mod export;
pub mod inventory;
pub mod metadata;
pub mod page;

const USER_AGENT: &str = concat!("grapher-map-scanner/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. Timeouts are applied per request.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .gzip(true)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .context("building HTTP client")
}

/// Append one path segment to `base`, keeping whatever path it already has.
/// `https://host/grapher` + `a.csv` → `https://host/grapher/a.csv`.
pub fn join_segment(base: &Url, segment: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{} cannot be a base URL", base))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

pub(crate) async fn get_text(client: &Client, url: &Url, timeout: Duration) -> Result<String> {
    debug!("Fetching text from {}", url);
    client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .await
        .with_context(|| format!("Reading text from {}", url))
}

pub(crate) async fn get_json(client: &Client, url: &Url, timeout: Duration) -> Result<Value> {
    let body = get_text(client, url, timeout).await?;
    serde_json::from_str(&body).with_context(|| format!("Decoding JSON from {}", url))
}
