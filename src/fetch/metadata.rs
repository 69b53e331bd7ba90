// src/fetch/metadata.rs

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::{get_json, join_segment};
use crate::years::{normalize_year, YearSet};

/// `{base}/{id}.metadata.json`
pub fn metadata_url(base: &Url, indicator: u64) -> Result<Url> {
    join_segment(base, &format!("{}.metadata.json", indicator))
}

/// Years listed under `dimensions.years.values[].id`.
pub fn years_from_metadata(doc: &Value) -> Result<YearSet> {
    let values = doc
        .pointer("/dimensions/years/values")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("metadata has no dimensions.years.values array"))?;

    Ok(values
        .iter()
        .filter_map(|v| v.get("id"))
        .filter_map(|id| match id {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Value::String(s) => normalize_year(s),
            _ => None,
        })
        .collect())
}

#[instrument(level = "debug", skip(client, base, timeout))]
pub async fn fetch_indicator_years(
    client: &Client,
    base: &Url,
    indicator: u64,
    timeout: Duration,
) -> Result<YearSet> {
    let url = metadata_url(base, indicator)?;
    let doc = get_json(client, &url, timeout).await?;
    years_from_metadata(&doc)
}
