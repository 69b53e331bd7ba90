// src/classify.rs

use serde::{Serialize, Serializer};
use std::{cmp::Ordering, fmt};
use url::Url;

use crate::chart::{ChartRecord, ParsedMapConfig};
use crate::fetch::join_segment;
use crate::years::YearSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YesNo {
    Yes,
    No,
}

impl From<bool> for YesNo {
    fn from(b: bool) -> Self {
        if b {
            YesNo::Yes
        } else {
            YesNo::No
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SingleYear {
    Yes,
    No,
    Unknown,
}

impl fmt::Display for SingleYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SingleYear::Yes => "Yes",
            SingleYear::No => "No",
            SingleYear::Unknown => "Unknown",
        })
    }
}

/// Config-only evidence that a map shows one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleYearSignal {
    TimelineHidden,
    PinnedMapTime,
    EqualBounds,
}

pub fn single_year_signal(config: &ParsedMapConfig) -> Option<SingleYearSignal> {
    if !config.has_timeline {
        return Some(SingleYearSignal::TimelineHidden);
    }
    if config.map_time.is_some() {
        return Some(SingleYearSignal::PinnedMapTime);
    }
    match (&config.min_time, &config.max_time) {
        (Some(min), Some(max)) if min == max => Some(SingleYearSignal::EqualBounds),
        _ => None,
    }
}

pub fn single_year(config: &ParsedMapConfig, years: &YearSet) -> SingleYear {
    if single_year_signal(config).is_some() {
        return SingleYear::Yes;
    }
    match years.len() {
        0 => SingleYear::Unknown,
        1 => SingleYear::Yes,
        _ => SingleYear::No,
    }
}

/// One report row. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub chart_id: String,
    pub slug: String,
    pub title: String,
    pub url: String,
    pub has_map_tab: YesNo,
    pub max_time: Option<String>,
    pub min_time: Option<String>,
    pub default_tab: Option<String>,
    #[serde(serialize_with = "title_case_bool")]
    pub is_published: bool,
    pub entity_type: Option<String>,
    pub single_year_data: SingleYear,
    pub len_years: usize,
    pub has_timeline: YesNo,
}

/// Published flags are written `True`/`False`, as the source database
/// exports them.
fn title_case_bool<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(if *value { "True" } else { "False" })
}

/// Chart page URL, pointing at the map tab when there is one.
pub fn chart_url(grapher: &Url, slug: &str, map_tab: bool) -> String {
    match join_segment(grapher, slug) {
        Ok(mut url) => {
            if map_tab {
                url.set_query(Some("tab=map"));
            }
            url.to_string()
        }
        Err(_) => {
            let base = format!("{}/{}", grapher.as_str().trim_end_matches('/'), slug);
            if map_tab {
                format!("{}?tab=map", base)
            } else {
                base
            }
        }
    }
}

/// Combine a chart, its parsed config and its years into a report row.
pub fn classify(
    chart: &ChartRecord,
    config: &ParsedMapConfig,
    years: &YearSet,
    grapher: &Url,
) -> ClassificationResult {
    let max_time = config
        .max_time
        .as_ref()
        .map(|t| t.to_string())
        .or_else(|| years.last().map(|y| y.to_string()));
    let min_time = config
        .min_time
        .as_ref()
        .map(|t| t.to_string())
        .or_else(|| years.first().map(|y| y.to_string()));

    ClassificationResult {
        chart_id: chart.id.clone(),
        slug: chart.slug.clone(),
        title: chart.title.clone(),
        url: chart_url(grapher, &chart.slug, config.has_map_tab),
        has_map_tab: config.has_map_tab.into(),
        max_time,
        min_time,
        default_tab: config.default_tab.clone(),
        is_published: chart.is_published,
        entity_type: config.entity_type.clone(),
        single_year_data: single_year(config, years),
        len_years: years.len(),
        has_timeline: config.has_timeline.into(),
    }
}

/// Numeric ids compare numerically; anything else falls back to text.
pub fn compare_chart_ids(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
