// src/years/mod.rs

use csv::{ReaderBuilder, Trim};
use std::collections::BTreeSet;
use tracing::trace;

pub mod store;

pub use store::YearStore;

/// Distinct calendar years found for one chart.
pub type YearSet = BTreeSet<i64>;

/// Header names accepted as the temporal column (case-insensitive).
const YEAR_HEADERS: &[&str] = &["year", "time", "date"];

/// Exports typically read `Entity,Code,Year,...`; this is where the year
/// usually sits when the header gives no hint. A best guess, not a contract.
pub const POSITIONAL_YEAR_COLUMN: usize = 2;

/// How the year column of an export was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnResolution {
    /// A header cell named `year`, `time` or `date`.
    Header(usize),
    /// No header matched; fell back to [`POSITIONAL_YEAR_COLUMN`].
    Positional(usize),
}

impl ColumnResolution {
    pub fn index(&self) -> usize {
        match *self {
            ColumnResolution::Header(i) | ColumnResolution::Positional(i) => i,
        }
    }
}

/// Years pulled from one tabular export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportYears {
    pub years: YearSet,
    /// `None` when the export had no header row at all.
    pub column: Option<ColumnResolution>,
}

/// Where a chart's final year set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSource {
    Export(ColumnResolution),
    Indicator(u64),
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedYears {
    pub years: YearSet,
    pub source: YearSource,
}

impl ResolvedYears {
    pub fn unresolved() -> Self {
        Self {
            years: YearSet::new(),
            source: YearSource::Unresolved,
        }
    }
}

/// Reduce a year-ish token to a bare year: `"1990-01-01"` → 1990,
/// `"2015.0"` → 2015. A leading minus is a sign, not a date separator.
pub fn normalize_year(token: &str) -> Option<i64> {
    let token = token.trim().trim_matches('"').trim();
    let head = match token.char_indices().skip(1).find(|&(_, c)| c == '-') {
        Some((idx, _)) => &token[..idx],
        None => token,
    };
    let value: f64 = head.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.trunc() as i64)
}

pub fn resolve_year_column<'a, I>(headers: I) -> ColumnResolution
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .position(|h| {
            let h = h.trim().trim_start_matches('\u{feff}').trim();
            YEAR_HEADERS.iter().any(|name| h.eq_ignore_ascii_case(name))
        })
        .map(ColumnResolution::Header)
        .unwrap_or(ColumnResolution::Positional(POSITIONAL_YEAR_COLUMN))
}

/// Collect the distinct years of a comma-separated export whose first row
/// is a header. Short or unparseable rows are skipped.
pub fn parse_export(text: &str) -> ExportYears {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut records = rdr.records();

    let column = match records.next() {
        Some(Ok(header)) => resolve_year_column(header.iter()),
        Some(Err(e)) => {
            trace!(error = %e, "unreadable export header");
            return ExportYears::default();
        }
        None => return ExportYears::default(),
    };

    let idx = column.index();
    let mut years = YearSet::new();
    for record in records {
        let Ok(record) = record else { continue };
        if let Some(year) = record.get(idx).and_then(normalize_year) {
            years.insert(year);
        }
    }

    ExportYears {
        years,
        column: Some(column),
    }
}
