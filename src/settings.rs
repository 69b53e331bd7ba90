// src/settings.rs

use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::fetch::inventory::InventoryMode;

pub const DEFAULT_API_URL: &str = "https://datasette-public.owid.io/owid.json";
pub const DEFAULT_GRAPHER_URL: &str = "https://ourworldindata.org/grapher";
pub const DEFAULT_METADATA_URL: &str = "https://api.ourworldindata.org/v1/indicators";

/// Upper bound for the worker pool.
pub const MAX_WORKERS: usize = 32;

/// Rows the query service returns per page at most. A larger request comes
/// back short and would end pagination after the first page.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Per-request timeouts. Nothing is retried, so these bound every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub inventory_page: Duration,
    pub count_probe: Duration,
    pub export: Duration,
    pub metadata: Duration,
    pub page: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            inventory_page: Duration::from_secs(120),
            count_probe: Duration::from_secs(30),
            export: Duration::from_secs(30),
            metadata: Duration::from_secs(30),
            page: Duration::from_secs(30),
        }
    }
}

/// Everything one scan needs: endpoints, output locations and knobs.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Tabular query service (`?sql=...&_size=...`).
    pub api_url: Url,
    /// Chart pages and `{slug}.csv` exports live under this base.
    pub grapher_url: Url,
    /// `{id}.metadata.json` per indicator.
    pub metadata_url: Url,

    pub output: PathBuf,
    pub cache_dir: PathBuf,
    pub debug_dump: Option<PathBuf>,

    pub page_size: usize,
    /// 1 = sequential, anything above runs a bounded pool of that size.
    pub workers: usize,
    pub mode: InventoryMode,
    pub limit: Option<usize>,

    pub fetch_years: bool,
    pub refresh_cache: bool,
    pub html_probe: bool,
    pub sorted: bool,

    pub timeouts: Timeouts,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL should parse"),
            grapher_url: Url::parse(DEFAULT_GRAPHER_URL).expect("default grapher URL should parse"),
            metadata_url: Url::parse(DEFAULT_METADATA_URL)
                .expect("default metadata URL should parse"),
            output: PathBuf::from("owid_grapher_maps_complete.csv"),
            cache_dir: PathBuf::from("chart_cache"),
            debug_dump: Some(PathBuf::from("debug_data.json")),
            page_size: 1000,
            workers: 1,
            mode: InventoryMode::MapCandidates,
            limit: None,
            fetch_years: true,
            refresh_cache: false,
            html_probe: false,
            sorted: false,
            timeouts: Timeouts::default(),
        }
    }
}

impl ScanSettings {
    /// Clamp the numeric knobs into their usable ranges.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.workers = self.workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.workers > 1
    }
}
