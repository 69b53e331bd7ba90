// src/fetch/inventory.rs

use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::HashSet, fmt, fs, path::Path, str::FromStr};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::get_json;
use crate::chart::ChartRecord;
use crate::settings::ScanSettings;

const CHART_COLUMNS: &str = "id, slug, title, type, isPublished, config";

/// Which charts the inventory query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InventoryMode {
    /// Rows whose config text mentions a map tab.
    #[default]
    MapCandidates,
    All,
}

impl InventoryMode {
    fn predicate(&self) -> &'static str {
        match self {
            InventoryMode::MapCandidates => {
                r#"WHERE config LIKE '%hasMapTab%' OR config LIKE '%"tab": "map"%' OR config LIKE '%"tab":"map"%'"#
            }
            InventoryMode::All => "",
        }
    }
}

impl FromStr for InventoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map-candidates" | "map" => Ok(InventoryMode::MapCandidates),
            "all" => Ok(InventoryMode::All),
            other => Err(format!("unknown inventory mode `{}` (map-candidates|all)", other)),
        }
    }
}

impl fmt::Display for InventoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InventoryMode::MapCandidates => "map-candidates",
            InventoryMode::All => "all",
        })
    }
}

pub fn page_sql(mode: InventoryMode, limit: usize, offset: usize) -> String {
    format!(
        "SELECT {} FROM charts {} ORDER BY id LIMIT {} OFFSET {}",
        CHART_COLUMNS,
        mode.predicate(),
        limit,
        offset
    )
}

pub fn count_sql(mode: InventoryMode) -> String {
    format!("SELECT count(id) AS total FROM charts {}", mode.predicate())
}

/// Body of a query response. Current deployments answer with positional
/// `rows` under `columns`; an older one returned a single `csv` text blob.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub csv: Option<String>,
}

/// One decoded page: how many rows the service sent, and the ones that
/// made valid records.
#[derive(Debug, Default)]
pub struct Page {
    pub raw_rows: usize,
    pub records: Vec<ChartRecord>,
}

impl QueryResponse {
    pub fn into_page(self) -> Page {
        if self.rows.is_empty() {
            if let Some(text) = self.csv.as_deref() {
                return csv_page(text);
            }
        }

        let raw_rows = self.rows.len();
        let mut records = Vec::with_capacity(raw_rows);
        for row in self.rows {
            let obj: Map<String, Value> = self.columns.iter().cloned().zip(row).collect();
            match serde_json::from_value::<ChartRecord>(Value::Object(obj)) {
                Ok(rec) => records.push(rec),
                Err(e) => warn!(error = %e, "skipping malformed inventory row"),
            }
        }
        Page { raw_rows, records }
    }
}

fn csv_page(text: &str) -> Page {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(e) => {
            warn!(error = %e, "unreadable csv inventory header");
            return Page::default();
        }
    };

    let mut page = Page::default();
    for record in rdr.records() {
        page.raw_rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed csv inventory row");
                continue;
            }
        };
        let obj: Map<String, Value> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|v| Value::String(v.to_string())))
            .collect();
        match serde_json::from_value::<ChartRecord>(Value::Object(obj)) {
            Ok(rec) => page.records.push(rec),
            Err(e) => warn!(error = %e, "skipping malformed csv inventory row"),
        }
    }
    page
}

/// Charts returned by one inventory run.
#[derive(Debug, Default)]
pub struct Inventory {
    pub charts: Vec<ChartRecord>,
    /// Row count reported by the probe, when it answered.
    pub total: Option<u64>,
    /// False when a later page failed and `charts` is a prefix.
    pub complete: bool,
}

fn query_url(api: &Url, sql: &str, size: &str) -> Url {
    let mut url = api.clone();
    url.query_pairs_mut()
        .append_pair("sql", sql)
        .append_pair("_size", size);
    url
}

/// Ask the service how many charts match `mode`.
pub async fn count_charts(client: &Client, settings: &ScanSettings) -> Result<u64> {
    let url = query_url(&settings.api_url, &count_sql(settings.mode), "1");
    let resp: QueryResponse = serde_json::from_value(
        get_json(client, &url, settings.timeouts.count_probe).await?,
    )
    .context("decoding count response")?;
    let cell = resp
        .rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| anyhow!("count response has no rows"))?;
    match cell {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("count cell is not a number: {}", cell))
}

/// Page through the chart table until a short page comes back.
///
/// A failing first page is fatal. A failure further in ends pagination and
/// keeps what was collected. Slugs are deduplicated, first one wins.
#[instrument(level = "info", skip(client, settings), fields(mode = %settings.mode))]
pub async fn fetch_inventory(client: &Client, settings: &ScanSettings) -> Result<Inventory> {
    let total = match count_charts(client, settings).await {
        Ok(n) => {
            info!("Total charts to fetch: {}", n);
            Some(n)
        }
        Err(e) => {
            warn!(error = %e, "could not get chart count");
            None
        }
    };

    let page_size = settings.page_size.max(1);
    let size = page_size.to_string();
    let mut inventory = Inventory {
        total,
        complete: true,
        ..Inventory::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0usize;

    loop {
        let url = query_url(&settings.api_url, &page_sql(settings.mode, page_size, offset), &size);
        let body = match get_json(client, &url, settings.timeouts.inventory_page).await {
            Ok(body) => body,
            Err(e) if offset == 0 => return Err(e.context("fetching first inventory page")),
            Err(e) => {
                warn!(offset, error = %e, "inventory page failed; keeping partial result");
                inventory.complete = false;
                break;
            }
        };

        if offset == 0 {
            if let Some(path) = settings.debug_dump.as_deref() {
                match write_debug_dump(path, &body) {
                    Ok(()) => debug!(path = %path.display(), "wrote first page dump"),
                    Err(e) => warn!(error = %e, "could not write first page dump"),
                }
            }
        }

        let resp: QueryResponse = match serde_json::from_value(body) {
            Ok(resp) => resp,
            Err(e) if offset == 0 => {
                return Err(anyhow!(e).context("decoding first inventory page"))
            }
            Err(e) => {
                warn!(offset, error = %e, "undecodable inventory page; keeping partial result");
                inventory.complete = false;
                break;
            }
        };

        let page = resp.into_page();
        if page.raw_rows == 0 {
            break;
        }
        for rec in page.records {
            if seen.insert(rec.slug.clone()) {
                inventory.charts.push(rec);
            } else {
                debug!(slug = %rec.slug, "duplicate slug dropped");
            }
        }

        let fetched = inventory.charts.len();
        match total {
            Some(t) if t > 0 => info!(
                "Fetched {} charts (offset: {}, total: {}/{} - {:.1}%)",
                page.raw_rows,
                offset,
                fetched,
                t,
                fetched as f64 / t as f64 * 100.0
            ),
            _ => info!(
                "Fetched {} charts (offset: {}, total so far: {})",
                page.raw_rows, offset, fetched
            ),
        }

        if page.raw_rows < page_size {
            break;
        }
        offset += page_size;
    }

    info!("Found {} charts with potential map support", inventory.charts.len());
    Ok(inventory)
}

fn write_debug_dump(path: &Path, body: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(body)?;
    fs::write(path, json).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
