// src/years/store.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    collections::HashMap,
    fs,
    hash::Hash,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};
use tokio::{fs as tokio_fs, sync::OnceCell};
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use super::{parse_export, ExportYears, ResolvedYears, YearSet, YearSource};
use crate::chart::ParsedMapConfig;
use crate::fetch::{export::download_export, metadata::fetch_indicator_years};
use crate::settings::ScanSettings;

/// Per-key memo: the map lock is only held to find or insert the cell, and
/// the cell makes concurrent callers for the same key wait on one load.
struct Memo<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K: Eq + Hash + Clone, V> Memo<K, V> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key.clone()).or_default())
    }
}

/// Run-scoped source of chart years.
///
/// Exports are read from `<cache_dir>/<slug>.csv` when present, otherwise
/// downloaded and written there (empty when the download failed, so a
/// later run does not ask again). Results are memoised per slug and per
/// indicator for the lifetime of the store.
pub struct YearStore {
    client: Client,
    grapher_url: Url,
    metadata_url: Url,
    cache_dir: PathBuf,
    refresh: bool,
    export_timeout: Duration,
    metadata_timeout: Duration,
    exports: Memo<String, ExportYears>,
    indicators: Memo<u64, YearSet>,
    network_fetches: AtomicUsize,
}

impl YearStore {
    pub fn new(client: Client, settings: &ScanSettings) -> Result<Self> {
        fs::create_dir_all(&settings.cache_dir)
            .with_context(|| format!("creating cache directory {:?}", settings.cache_dir))?;
        Ok(Self {
            client,
            grapher_url: settings.grapher_url.clone(),
            metadata_url: settings.metadata_url.clone(),
            cache_dir: settings.cache_dir.clone(),
            refresh: settings.refresh_cache,
            export_timeout: settings.timeouts.export,
            metadata_timeout: settings.timeouts.metadata,
            exports: Memo::new(),
            indicators: Memo::new(),
            network_fetches: AtomicUsize::new(0),
        })
    }

    /// Remote requests issued so far (exports and metadata).
    pub fn network_fetches(&self) -> usize {
        self.network_fetches.load(Ordering::Relaxed)
    }

    pub fn cache_path(&self, slug: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.csv", cache_stem(slug)))
    }

    /// Years in the chart's own export.
    pub async fn export_years(&self, slug: &str) -> ExportYears {
        let cell = self.exports.cell(&slug.to_string());
        cell.get_or_init(|| self.load_export(slug)).await.clone()
    }

    /// Years the indicator's metadata lists. Empty on any failure.
    pub async fn indicator_years(&self, indicator: u64) -> YearSet {
        let cell = self.indicators.cell(&indicator);
        cell.get_or_init(|| async {
            self.network_fetches.fetch_add(1, Ordering::Relaxed);
            match fetch_indicator_years(
                &self.client,
                &self.metadata_url,
                indicator,
                self.metadata_timeout,
            )
            .await
            {
                Ok(years) => years,
                Err(e) => {
                    warn!(indicator, error = %e, "indicator metadata unavailable");
                    YearSet::new()
                }
            }
        })
        .await
        .clone()
    }

    /// The export first; the `y` indicator's metadata only if the export
    /// gave nothing.
    pub async fn resolve(&self, slug: &str, config: &ParsedMapConfig) -> ResolvedYears {
        let export = self.export_years(slug).await;
        if let (false, Some(column)) = (export.years.is_empty(), export.column) {
            return ResolvedYears {
                years: export.years,
                source: YearSource::Export(column),
            };
        }

        let Some(indicator) = config.y_indicator() else {
            debug!(%slug, "no y dimension to fall back on");
            return ResolvedYears::unresolved();
        };
        let years = self.indicator_years(indicator).await;
        if years.is_empty() {
            ResolvedYears::unresolved()
        } else {
            ResolvedYears {
                years,
                source: YearSource::Indicator(indicator),
            }
        }
    }

    async fn load_export(&self, slug: &str) -> ExportYears {
        let path = self.cache_path(slug);
        if !self.refresh && path.exists() {
            match tokio_fs::read_to_string(&path).await {
                Ok(text) => {
                    debug!(%slug, path = %path.display(), "export from cache");
                    return parse_export(&text);
                }
                Err(e) => {
                    warn!(%slug, error = %e, "unreadable cache file");
                    return ExportYears::default();
                }
            }
        }

        self.network_fetches.fetch_add(1, Ordering::Relaxed);
        let text = match download_export(&self.client, &self.grapher_url, slug, self.export_timeout)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Error fetching data for {}: {:#}", slug, e);
                String::new()
            }
        };

        if let Err(e) = write_cache(&path, &text).await {
            warn!(%slug, error = %e, "could not write cache file");
        }
        parse_export(&text)
    }
}

/// Percent-encoded slug. Distinct slugs never share a file, and no
/// separator survives to escape the cache directory.
fn cache_stem(slug: &str) -> String {
    form_urlencoded::byte_serialize(slug.as_bytes()).collect()
}

async fn write_cache(path: &Path, text: &str) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    tokio_fs::write(&tmp, text)
        .await
        .with_context(|| format!("writing {:?}", tmp))?;
    tokio_fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {:?} -> {:?}", tmp, path))?;
    Ok(())
}
