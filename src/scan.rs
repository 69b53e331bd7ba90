// src/scan.rs

use anyhow::Result;
use futures::{stream::FuturesUnordered, StreamExt};
use reqwest::Client;
use tracing::{debug, info, instrument};

use crate::chart::{parse_chart_config, ChartRecord, ParsedMapConfig};
use crate::classify::{classify, compare_chart_ids, ClassificationResult, YesNo};
use crate::fetch::{build_client, inventory::fetch_inventory, page::probe_map_tab};
use crate::settings::ScanSettings;
use crate::years::{ResolvedYears, YearStore};

/// Result of a whole scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub rows: Vec<ClassificationResult>,
    /// Charts the inventory reported, before `limit`.
    pub inventory_size: usize,
    pub inventory_complete: bool,
}

/// Drives inventory → per-chart classification for one run.
pub struct Scanner {
    client: Client,
    settings: ScanSettings,
    years: YearStore,
}

impl Scanner {
    pub fn new(settings: ScanSettings) -> Result<Self> {
        Self::with_client(build_client()?, settings)
    }

    pub fn with_client(client: Client, settings: ScanSettings) -> Result<Self> {
        let settings = settings.normalized();
        let years = YearStore::new(client.clone(), &settings)?;
        Ok(Self {
            client,
            settings,
            years,
        })
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn years(&self) -> &YearStore {
        &self.years
    }

    /// Fetch the inventory and classify every chart in it. Only an
    /// inventory failure is an error.
    #[instrument(level = "info", skip(self), fields(workers = self.settings.workers))]
    pub async fn run(&self) -> Result<ScanOutcome> {
        let inventory = fetch_inventory(&self.client, &self.settings).await?;
        let inventory_size = inventory.charts.len();
        let mut charts = inventory.charts;
        if let Some(limit) = self.settings.limit {
            charts.truncate(limit);
        }

        info!("Analyzing {} charts...", charts.len());
        let rows = self.classify_all(&charts).await;
        Ok(ScanOutcome {
            rows,
            inventory_size,
            inventory_complete: inventory.complete,
        })
    }

    /// Classify `charts`, sequentially or through the bounded pool.
    /// Pool output is ordered by chart id; sequential output keeps input
    /// order unless `sorted` is set.
    pub async fn classify_all(&self, charts: &[ChartRecord]) -> Vec<ClassificationResult> {
        let mut rows = if self.settings.is_parallel() {
            self.classify_pooled(charts).await
        } else {
            let mut rows = Vec::with_capacity(charts.len());
            for chart in charts {
                rows.push(self.classify_chart(chart).await);
            }
            rows
        };

        if self.settings.is_parallel() || self.settings.sorted {
            rows.sort_by(|a, b| compare_chart_ids(&a.chart_id, &b.chart_id));
        }
        rows
    }

    async fn classify_pooled(&self, charts: &[ChartRecord]) -> Vec<ClassificationResult> {
        let workers = self.settings.workers;
        let mut tasks = FuturesUnordered::new();
        let mut rows = Vec::with_capacity(charts.len());

        for chart in charts {
            tasks.push(self.classify_chart(chart));

            // throttle concurrency
            if tasks.len() >= workers {
                if let Some(row) = tasks.next().await {
                    rows.push(row);
                }
            }
        }

        // drain remaining tasks
        while let Some(row) = tasks.next().await {
            rows.push(row);
        }
        rows
    }

    /// One chart end to end: config, years, classification.
    pub async fn classify_chart(&self, chart: &ChartRecord) -> ClassificationResult {
        let config = self.map_config(chart).await;

        let resolved = if self.settings.fetch_years {
            self.years.resolve(&chart.slug, &config).await
        } else {
            ResolvedYears::unresolved()
        };
        debug!(slug = %chart.slug, source = ?resolved.source, config = ?config.source, "years resolved");

        let row = classify(chart, &config, &resolved.years, &self.settings.grapher_url);

        let status = if row.has_map_tab == YesNo::Yes { "MAP" } else { "no map" };
        let published = if row.is_published { "PUB" } else { "draft" };
        let title: String = row.title.chars().take(50).collect();
        info!("[{}] [{}] {}: {}", status, published, row.slug, title);
        row
    }

    async fn map_config(&self, chart: &ChartRecord) -> ParsedMapConfig {
        match chart.config.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(raw) => parse_chart_config(raw),
            None if self.settings.html_probe => {
                let mut config = ParsedMapConfig::default();
                config.has_map_tab = probe_map_tab(
                    &self.client,
                    &self.settings.grapher_url,
                    &chart.slug,
                    self.settings.timeouts.page,
                )
                .await;
                config
            }
            None => ParsedMapConfig::default(),
        }
    }
}
