//! Event record data structures.
//!
//! A record is what the semantic extractor produced for one event after
//! repair and validation. Field shapes are lenient on input because model
//! output is inconsistent: `topics` may arrive as a single string, list
//! fields may be `null`, and `dates`/`location` may be text or objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A structured event record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Official event name
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub event_name: Option<String>,

    /// Date range, either `{start, end, timezone}` or free text
    #[serde(default, deserialize_with = "lenient::opt_value")]
    pub dates: Option<Value>,

    /// Venue details, either an object with venue/city/country flags or free text
    #[serde(default, deserialize_with = "lenient::opt_value")]
    pub location: Option<Value>,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient::string_list")]
    pub topics: Vec<String>,

    #[serde(default, deserialize_with = "lenient::opt_registration")]
    pub registration: Option<Registration>,

    /// Speaker objects (`{name, title, organization}`) or plain names
    #[serde(default, deserialize_with = "lenient::value_list")]
    pub speakers: Vec<Value>,

    #[serde(default, deserialize_with = "lenient::opt_value")]
    pub organizer: Option<Value>,

    /// Page the record was extracted from
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub source_url: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Keys the model returned outside the known schema
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    /// Convert a repaired JSON object into a record.
    pub fn from_object(object: Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(object))
    }

    /// Display name used in log lines.
    pub fn display_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or("Unknown Event")
    }

    /// Registration prices, empty when there is no registration block.
    pub fn prices(&self) -> &[Value] {
        self.registration
            .as_ref()
            .map(|r| r.prices.as_slice())
            .unwrap_or_default()
    }
}

/// Registration details.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub deadline: Option<String>,

    /// Price tiers (`{type, amount, currency, valid_until}`) or price strings
    #[serde(default, deserialize_with = "lenient::value_list")]
    pub prices: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Registration {
    pub fn is_empty(&self) -> bool {
        is_blank(&self.url)
            && is_blank(&self.deadline)
            && self.prices.iter().all(is_empty_value)
            && self.extra.values().all(is_empty_value)
    }
}

/// Whether an optional string is missing or only whitespace.
pub fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Recursive emptiness: `null`, blank strings, and containers whose members
/// are all empty. `false` and `0` count as values.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(map) => map.values().all(is_empty_value),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

mod lenient {
    use super::*;

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        })
    }

    pub fn opt_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok((!is_empty_value(&value)).then_some(value))
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Vec::new(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Value::Array(items) => items
                .into_iter()
                .filter(|v| !is_empty_value(v))
                .map(|v| match v {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .collect(),
            other => vec![other.to_string()],
        })
    }

    /// Timestamps the model invents are not trusted; unparsable ones are dropped.
    pub fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        })
    }

    pub fn value_list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().filter(|v| !is_empty_value(v)).collect(),
            other if is_empty_value(&other) => Vec::new(),
            other => vec![other],
        })
    }

    pub fn opt_registration<'de, D>(deserializer: D) -> Result<Option<Registration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let registration = match value {
            Value::Object(_) => {
                serde_json::from_value::<Registration>(value).map_err(serde::de::Error::custom)?
            }
            // A bare URL string is the most common degenerate shape
            Value::String(s) if !s.trim().is_empty() => Registration {
                url: Some(s),
                ..Registration::default()
            },
            _ => return Ok(None),
        };
        Ok((!registration.is_empty()).then_some(registration))
    }
}
