// src/chart/config.rs

use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

use super::record::truthy;
use crate::years::normalize_year;

/// A time value as it appears in chart configs: a year, a sentinel, or
/// text that is present but not a recognisable year.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeValue {
    Year(i64),
    Latest,
    Earliest,
    Unparsed(String),
}

impl TimeValue {
    /// Numbers become years. Strings go through the same date-cutting rule
    /// as export cells (`"2020-06-30"` → 2020); `latest`/`earliest` map to
    /// the sentinels; other non-empty text is kept as [`TimeValue::Unparsed`].
    /// Null, empty strings and other JSON types are absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(TimeValue::Year),
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else if s.eq_ignore_ascii_case("latest") {
                    Some(TimeValue::Latest)
                } else if s.eq_ignore_ascii_case("earliest") {
                    Some(TimeValue::Earliest)
                } else {
                    Some(
                        normalize_year(s)
                            .map(TimeValue::Year)
                            .unwrap_or_else(|| TimeValue::Unparsed(s.to_string())),
                    )
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Year(y) => write!(f, "{}", y),
            TimeValue::Latest => f.write_str("latest"),
            TimeValue::Earliest => f.write_str("earliest"),
            TimeValue::Unparsed(s) => f.write_str(s),
        }
    }
}

/// One entry of the chart's `dimensions` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub property: String,
    pub variable_id: Option<u64>,
}

/// How the configuration text was turned into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Parsed after collapsing doubled quotes (`""` → `"`).
    Unescaped,
    /// Collapsing broke the document; the original text parsed as-is.
    Verbatim,
    /// Nothing parsed; every field holds its default.
    #[default]
    Default,
}

/// The map-relevant view of a chart configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMapConfig {
    /// Explicit `hasMapTab` OR `tab == "map"`.
    pub has_map_tab: bool,
    pub default_tab: Option<String>,
    pub map_column_slug: Option<String>,
    /// Pinned display year of the map (`map.time`), not a bound.
    pub map_time: Option<TimeValue>,
    pub has_timeline: bool,
    pub entity_type: Option<String>,
    pub max_time: Option<TimeValue>,
    pub min_time: Option<TimeValue>,
    pub dimensions: Vec<Dimension>,
    pub source: ConfigSource,
}

impl Default for ParsedMapConfig {
    fn default() -> Self {
        Self {
            has_map_tab: false,
            default_tab: None,
            map_column_slug: None,
            map_time: None,
            has_timeline: true,
            entity_type: None,
            max_time: None,
            min_time: None,
            dimensions: Vec::new(),
            source: ConfigSource::Default,
        }
    }
}

impl ParsedMapConfig {
    /// Indicator behind the `y` dimension, the chart's primary quantity.
    pub fn y_indicator(&self) -> Option<u64> {
        self.dimensions
            .iter()
            .find(|d| d.property == "y")
            .and_then(|d| d.variable_id)
    }
}

/// Parse raw configuration text. Never fails: anything unparseable yields
/// the default config.
///
/// The storage layer sometimes doubles every quote, so the doubled form is
/// collapsed first. That also damages legitimate empty strings (`""`), in
/// which case the untouched text is tried before giving up.
pub fn parse_chart_config(raw: &str) -> ParsedMapConfig {
    let collapsed = raw.replace("\"\"", "\"");
    let (doc, source) = match serde_json::from_str::<Value>(&collapsed) {
        Ok(doc) => (doc, ConfigSource::Unescaped),
        Err(first) => match serde_json::from_str::<Value>(raw) {
            Ok(doc) => (doc, ConfigSource::Verbatim),
            Err(second) => {
                debug!(collapsed = %first, verbatim = %second, "config did not parse");
                return ParsedMapConfig::default();
            }
        },
    };

    match doc.as_object() {
        Some(obj) => from_object(obj, source),
        None => {
            debug!("config is not a JSON object");
            ParsedMapConfig::default()
        }
    }
}

fn from_object(obj: &Map<String, Value>, source: ConfigSource) -> ParsedMapConfig {
    let mut info = ParsedMapConfig {
        source,
        ..ParsedMapConfig::default()
    };

    if obj.get("hasMapTab").map_or(false, truthy) {
        info.has_map_tab = true;
    }
    if obj.get("tab").and_then(Value::as_str) == Some("map") {
        info.default_tab = Some("map".to_string());
        info.has_map_tab = true;
    }

    if let Some(map) = obj.get("map").and_then(Value::as_object) {
        info.map_column_slug = text(map.get("columnSlug"));
        info.map_time = map.get("time").and_then(TimeValue::from_json);
        if map.get("hideTimeline").map_or(false, truthy) {
            info.has_timeline = false;
        }
    }

    info.entity_type = text(obj.get("entityType"));

    // Top-level bounds first; the timeline-prefixed names only when absent.
    info.max_time = bound(obj, "maxTime").or_else(|| bound(obj, "timelineMaxTime"));
    info.min_time = bound(obj, "minTime").or_else(|| bound(obj, "timelineMinTime"));

    if let Some(dims) = obj.get("dimensions").and_then(Value::as_array) {
        info.dimensions = dims.iter().filter_map(dimension).collect();
    }

    info
}

fn bound(obj: &Map<String, Value>, key: &str) -> Option<TimeValue> {
    obj.get(key).and_then(TimeValue::from_json)
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn dimension(value: &Value) -> Option<Dimension> {
    let obj = value.as_object()?;
    let property = obj.get("property")?.as_str()?.to_string();
    let variable_id = obj
        .get("variableId")
        .or_else(|| obj.get("indicatorId"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
    Some(Dimension {
        property,
        variable_id,
    })
}
