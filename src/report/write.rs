// src/report/write.rs

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

use crate::classify::{ClassificationResult, YesNo};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const COLUMNS: [&str; 13] = [
    "chart_id",
    "slug",
    "title",
    "url",
    "has_map_tab",
    "max_time",
    "min_time",
    "default_tab",
    "is_published",
    "entity_type",
    "single_year_data",
    "len_years",
    "has_timeline",
];

/// Where the artifacts of one run go, all derived from the main CSV path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub published: PathBuf,
}

impl ReportPaths {
    pub fn for_output(output: &Path) -> Self {
        let stem = output
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("report"));
        let mut published = stem;
        published.push("_published_only.csv");
        Self {
            csv: output.to_path_buf(),
            json: output.with_extension("json"),
            published: output.with_file_name(published),
        }
    }
}

/// Rows that are published and have a map, in their original order.
pub fn published_maps(rows: &[ClassificationResult]) -> Vec<&ClassificationResult> {
    rows.iter()
        .filter(|r| r.is_published && r.has_map_tab == YesNo::Yes)
        .collect()
}

/// BOM-prefixed UTF-8 CSV with a header row, even when `rows` is empty.
pub fn write_csv<'a, I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a ClassificationResult>,
{
    write_atomically(path, |out| {
        out.write_all(UTF8_BOM)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
        wtr.write_record(COLUMNS)?;
        let mut n = 0;
        for row in rows {
            wtr.serialize(row)?;
            n += 1;
        }
        wtr.flush()?;
        Ok(n)
    })
}

/// Pretty JSON array mirroring the CSV rows.
pub fn write_json<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_atomically(path, |out| {
        serde_json::to_writer_pretty(&mut *out, rows)?;
        out.write_all(b"\n")?;
        Ok(())
    })
}

/// Files produced by [`write_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub paths: ReportPaths,
    pub rows: usize,
    /// `None` when there were no published maps and no subset file was made.
    pub published_rows: Option<usize>,
}

/// Full CSV, JSON mirror, and (only if non-empty) the published-maps subset.
pub fn write_report(output: &Path, rows: &[ClassificationResult]) -> Result<Written> {
    let paths = ReportPaths::for_output(output);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }

    info!("Saving results to {}...", paths.csv.display());
    let n = write_csv(&paths.csv, rows)?;
    write_json(&paths.json, rows)?;

    let subset = published_maps(rows);
    let published_rows = if subset.is_empty() {
        None
    } else {
        let n = write_csv(&paths.published, subset)?;
        info!("Saved {} published maps to: {}", n, paths.published.display());
        Some(n)
    };

    Ok(Written {
        paths,
        rows: n,
        published_rows,
    })
}

/// Write to `<path>.tmp`, then rename over the target.
fn write_atomically<T, F>(path: &Path, body: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let file = File::create(&tmp).with_context(|| format!("creating {:?}", tmp))?;
    let mut out = BufWriter::new(file);
    let value = body(&mut out).with_context(|| format!("writing {:?}", tmp))?;
    out.flush().with_context(|| format!("flushing {:?}", tmp))?;
    drop(out);

    fs::rename(&tmp, path).with_context(|| format!("renaming {:?} -> {:?}", tmp, path))?;
    Ok(value)
}
