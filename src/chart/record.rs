// src/chart/record.rs

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// One chart row from the inventory query. Read-only once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartRecord {
    #[serde(deserialize_with = "de_chart_id")]
    pub id: String,
    /// Join key for every later stage.
    pub slug: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(rename = "type", default, deserialize_with = "de_opt_text")]
    pub kind: Option<String>,
    #[serde(rename = "isPublished", default, deserialize_with = "de_flag")]
    pub is_published: bool,
    /// Raw configuration document, possibly with doubled quotes.
    #[serde(default, deserialize_with = "de_opt_text")]
    pub config: Option<String>,
}

/// Loose truthiness used for flags coming out of the SQL service and chart
/// configs: `true`, non-zero numbers, and the strings `true`/`1` (any case).
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        _ => false,
    }
}

fn de_chart_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unsupported chart id: {}", other))),
    }
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(truthy(&Value::deserialize(d)?))
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(de_opt_text(d)?.unwrap_or_default())
}

/// Strings pass through, null becomes `None`, anything else (the service
/// sometimes hands back the config as a JSON object) is re-serialised.
fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
