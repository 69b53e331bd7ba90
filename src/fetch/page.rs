// src/fetch/page.rs

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

use super::join_segment;

const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Map markers inside the embedded grapher config or links.
static CONFIG_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""tab"\s*:\s*"map"|"hasMapTab"\s*:\s*(?:true|1)\b|tab=map"#)
        .expect("map marker regex should compile")
});

/// Map markers in the rendered markup.
static DOM_MARKERS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="tab=map"], [data-tab="map"], .map-tab"#)
        .expect("map marker selector should parse")
});

/// True if the chart page shows any sign of a map tab.
pub fn page_has_map_markers(html: &str) -> bool {
    if CONFIG_MARKERS.is_match(html) {
        return true;
    }
    let doc = Html::parse_document(html);
    let found = doc.select(&DOM_MARKERS).next().is_some();
    found
}

/// Fetch `{grapher}/{slug}` and look for map markers. Any failure counts as
/// "no map".
#[instrument(level = "debug", skip(client, grapher, timeout))]
pub async fn probe_map_tab(client: &Client, grapher: &Url, slug: &str, timeout: Duration) -> bool {
    let url = match join_segment(grapher, slug) {
        Ok(u) => u,
        Err(e) => {
            warn!(%slug, error = %e, "cannot build chart page URL");
            return false;
        }
    };

    let resp = client
        .get(url.clone())
        .header(header::USER_AGENT, BROWSER_UA)
        .timeout(timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status());
    let html = match resp {
        Ok(r) => r.text().await,
        Err(e) => Err(e),
    };

    match html {
        Ok(html) => page_has_map_markers(&html),
        Err(e) => {
            warn!(%url, error = %e, "chart page probe failed");
            false
        }
    }
}
