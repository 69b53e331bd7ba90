// src/fetch/export.rs

use anyhow::Result;
use reqwest::Client;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::{get_text, join_segment};

/// `{grapher}/{slug}.csv`
pub fn export_url(grapher: &Url, slug: &str) -> Result<Url> {
    join_segment(grapher, &format!("{}.csv", slug))
}

/// Download a chart's tabular export as text.
#[instrument(level = "debug", skip(client, grapher, timeout))]
pub async fn download_export(
    client: &Client,
    grapher: &Url,
    slug: &str,
    timeout: Duration,
) -> Result<String> {
    let url = export_url(grapher, slug)?;
    get_text(client, &url, timeout).await
}
