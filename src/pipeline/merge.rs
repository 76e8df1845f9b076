// src/pipeline/merge.rs

//! Field-by-field merge of two records that share a dedup key.
//!
//! Merging never drops information: lists are unioned, conflicting values
//! are kept side by side as `; `-joined readings, and differing names are
//! joined. Only the shorter description and a near-duplicate name are
//! discarded.
//! Merging a record with an identical copy of itself changes only
//! `last_updated`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{EventRecord, MergeConfig, Registration, is_blank, is_empty_value};

const READING_SEPARATOR: &str = "; ";
const NAME_SEPARATOR: &str = " / ";

/// Tunables for [`merge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    /// Normalized similarity at or above which two names are the same event
    pub name_similarity_threshold: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.8,
        }
    }
}

impl From<&MergeConfig> for MergePolicy {
    fn from(config: &MergeConfig) -> Self {
        Self {
            name_similarity_threshold: config.name_similarity_threshold,
        }
    }
}

/// Merge `incoming` into `existing`, stamping `last_updated` with `now`.
pub fn merge(
    existing: &EventRecord,
    incoming: &EventRecord,
    policy: &MergePolicy,
    now: DateTime<Utc>,
) -> EventRecord {
    EventRecord {
        event_name: merge_name(&existing.event_name, &incoming.event_name, policy),
        dates: merge_reading(&existing.dates, &incoming.dates),
        location: merge_reading(&existing.location, &incoming.location),
        description: longer(&existing.description, &incoming.description),
        topics: union(&existing.topics, &incoming.topics),
        registration: merge_registration(&existing.registration, &incoming.registration),
        speakers: union(&existing.speakers, &incoming.speakers),
        organizer: merge_object_value(&existing.organizer, &incoming.organizer),
        source_url: fill(&existing.source_url, &incoming.source_url),
        last_updated: Some(now),
        extra: fill_map(&existing.extra, &incoming.extra),
    }
}

fn fill(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    if is_blank(existing) {
        incoming.clone()
    } else {
        existing.clone()
    }
}

fn merge_name(
    existing: &Option<String>,
    incoming: &Option<String>,
    policy: &MergePolicy,
) -> Option<String> {
    let (Some(old), Some(new)) = (existing, incoming) else {
        return fill(existing, incoming);
    };
    if is_blank(incoming) {
        return existing.clone();
    }
    if is_blank(existing) {
        return incoming.clone();
    }

    let new_key = new.trim().to_lowercase();
    let same_event = old.split(NAME_SEPARATOR).any(|part| {
        let part = part.trim().to_lowercase();
        part == new_key
            || strsim::normalized_levenshtein(&part, &new_key) >= policy.name_similarity_threshold
    });

    if same_event {
        existing.clone()
    } else {
        Some(format!("{old}{NAME_SEPARATOR}{}", new.trim()))
    }
}

/// Keep both readings of a date or location when they disagree.
fn merge_reading(existing: &Option<Value>, incoming: &Option<Value>) -> Option<Value> {
    let (Some(old), Some(new)) = (existing, incoming) else {
        return existing.clone().or_else(|| incoming.clone());
    };
    if is_empty_value(new) || old == new {
        return existing.clone();
    }
    if is_empty_value(old) {
        return incoming.clone();
    }

    // Objects that only fill gaps in each other merge without conflict.
    if let (Value::Object(a), Value::Object(b)) = (old, new) {
        if compatible(a, b) {
            return Some(Value::Object(fill_map(a, b)));
        }
    }

    Some(Value::String(join_readings(&reading_text(old), &reading_text(new))))
}

/// `old; new`, unless `new` is already one of the readings in `old`.
fn join_readings(old: &str, new: &str) -> String {
    let (old, new) = (old.trim(), new.trim());
    if old.split(READING_SEPARATOR).any(|reading| reading.trim() == new) {
        old.to_string()
    } else {
        format!("{old}{READING_SEPARATOR}{new}")
    }
}

/// Both non-empty strings are kept as joined readings.
fn combine(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match (existing, incoming) {
        (Some(old), Some(new)) if !is_blank(existing) && !is_blank(incoming) => {
            Some(join_readings(old, new))
        }
        _ => fill(existing, incoming),
    }
}

/// Merge two values without losing either: objects key by key, lists as a
/// union, and differing scalars as joined readings.
fn merge_value(old: &Value, new: &Value) -> Value {
    if is_empty_value(new) || old == new {
        return old.clone();
    }
    if is_empty_value(old) {
        return new.clone();
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => Value::Object(fill_map(a, b)),
        (Value::Array(a), Value::Array(b)) => Value::Array(union(a, b)),
        _ => Value::String(join_readings(&reading_text(old), &reading_text(new))),
    }
}

/// No key holds different non-empty values in the two objects.
fn compatible(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    b.iter().all(|(key, value)| match a.get(key) {
        Some(current) => is_empty_value(current) || is_empty_value(value) || current == value,
        None => true,
    })
}

/// Human-readable text for a reading: strings verbatim, objects as
/// `key: value` pairs.
fn reading_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !is_empty_value(v))
            .map(|(k, v)| format!("{k}: {}", reading_text(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items
            .iter()
            .filter(|v| !is_empty_value(v))
            .map(reading_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn longer(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match (existing, incoming) {
        (Some(old), Some(new)) if new.chars().count() > old.chars().count() => incoming.clone(),
        _ => fill(existing, incoming),
    }
}

/// Existing order first, then novel incoming items, each once.
fn union<T: Clone + PartialEq>(existing: &[T], incoming: &[T]) -> Vec<T> {
    let mut merged: Vec<T> = Vec::with_capacity(existing.len() + incoming.len());
    for item in existing.iter().chain(incoming) {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

fn merge_registration(
    existing: &Option<Registration>,
    incoming: &Option<Registration>,
) -> Option<Registration> {
    match (existing, incoming) {
        (Some(old), Some(new)) => Some(Registration {
            url: combine(&old.url, &new.url),
            deadline: combine(&old.deadline, &new.deadline),
            prices: union(&old.prices, &new.prices),
            extra: fill_map(&old.extra, &new.extra),
        }),
        _ => existing.clone().or_else(|| incoming.clone()),
    }
}

fn merge_object_value(existing: &Option<Value>, incoming: &Option<Value>) -> Option<Value> {
    match (existing, incoming) {
        (Some(old), Some(new)) => Some(merge_value(old, new)),
        _ => existing.clone().or_else(|| incoming.clone()),
    }
}

/// Key-wise [`merge_value`]; keys only one side has are taken as they are.
fn fill_map(existing: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        let combined = match merged.get(key) {
            Some(current) => merge_value(current, value),
            None if is_empty_value(value) => continue,
            None => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EventRecord {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> EventRecord {
        record(json!({
            "event_name": "AI Summit 2025",
            "dates": {"start": "2025-03-03", "end": "2025-03-04"},
            "location": "San Francisco",
            "description": "Two days of talks",
            "topics": ["AI", "ML"],
            "registration": {"url": "https://ai-summit.example.com/register", "prices": ["$500"]},
            "speakers": [{"name": "Ada"}],
            "organizer": {"name": "Summit Org"},
            "source_url": "https://ai-summit.example.com/",
            "region": "US"
        }))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_merge_with_self_only_stamps_time() {
        let r = sample();
        let merged = merge(&r, &r, &MergePolicy::default(), now());
        assert_eq!(merged.last_updated, Some(now()));
        assert_eq!(
            EventRecord {
                last_updated: None,
                ..merged
            },
            r
        );
    }

    #[test]
    fn test_topics_union_existing_then_novel() {
        let a = record(json!({"topics": ["AI", "ML", "Robotics"]}));
        let b = record(json!({"topics": ["NLP", "ML", "AI", "Vision", "NLP"]}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(merged.topics, vec!["AI", "ML", "Robotics", "NLP", "Vision"]);
    }

    #[test]
    fn test_empty_incoming_ignored_and_empty_existing_filled() {
        let a = record(json!({"event_name": "Expo", "description": "Existing"}));
        let b = record(json!({"event_name": null, "description": "", "location": "Berlin"}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(merged.event_name.as_deref(), Some("Expo"));
        assert_eq!(merged.description.as_deref(), Some("Existing"));
        assert_eq!(merged.location, Some(json!("Berlin")));
    }

    #[test]
    fn test_longer_description_wins() {
        let a = record(json!({"description": "Short"}));
        let b = record(json!({"description": "A much longer description"}));
        let policy = MergePolicy::default();
        assert_eq!(
            merge(&a, &b, &policy, now()).description,
            b.description
        );
        assert_eq!(
            merge(&b, &a, &policy, now()).description,
            b.description
        );
    }

    #[test]
    fn test_conflicting_readings_are_joined_once() {
        let a = record(json!({"location": "San Francisco"}));
        let b = record(json!({"location": "Moscone Center"}));
        let policy = MergePolicy::default();

        let once = merge(&a, &b, &policy, now());
        assert_eq!(once.location, Some(json!("San Francisco; Moscone Center")));

        let twice = merge(&once, &b, &policy, now());
        assert_eq!(twice.location, once.location);
    }

    #[test]
    fn test_compatible_date_objects_fill_gaps() {
        let a = record(json!({"dates": {"start": "2025-03-03", "end": null}}));
        let b = record(json!({"dates": {"start": "2025-03-03", "end": "2025-03-04"}}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(
            merged.dates,
            Some(json!({"start": "2025-03-03", "end": "2025-03-04"}))
        );
    }

    #[test]
    fn test_conflicting_date_objects_become_text() {
        let a = record(json!({"dates": {"start": "2025-03-03"}}));
        let b = record(json!({"dates": {"start": "2025-04-01"}}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(
            merged.dates,
            Some(json!("start: 2025-03-03; start: 2025-04-01"))
        );
    }

    #[test]
    fn test_similar_names_keep_existing() {
        let a = record(json!({"event_name": "AI Summit 2025"}));
        let b = record(json!({"event_name": "AI Summit 2O25"}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(merged.event_name.as_deref(), Some("AI Summit 2025"));
    }

    #[test]
    fn test_different_names_are_joined_once() {
        let a = record(json!({"event_name": "AI Summit 2025"}));
        let b = record(json!({"event_name": "Robotics Expo"}));
        let policy = MergePolicy::default();

        let once = merge(&a, &b, &policy, now());
        assert_eq!(
            once.event_name.as_deref(),
            Some("AI Summit 2025 / Robotics Expo")
        );
        let twice = merge(&once, &b, &policy, now());
        assert_eq!(twice.event_name, once.event_name);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let a = record(json!({"event_name": "AI Summit 2025"}));
        let b = record(json!({"event_name": "AI Summit 2O25"}));
        let strict = MergePolicy {
            name_similarity_threshold: 1.0,
        };
        let merged = merge(&a, &b, &strict, now());
        assert_eq!(
            merged.event_name.as_deref(),
            Some("AI Summit 2025 / AI Summit 2O25")
        );
    }

    #[test]
    fn test_registration_and_organizer_merge_keywise() {
        let a = record(json!({
            "registration": {"url": "https://x.example.com/reg", "prices": ["$500"]},
            "organizer": {"name": "Org", "website": null}
        }));
        let b = record(json!({
            "registration": {"url": "https://other.example.com/", "deadline": "2025-02-01", "prices": ["$500", "$700"]},
            "organizer": {"name": "Other", "website": "https://org.example.com"}
        }));
        let merged = merge(&a, &b, &MergePolicy::default(), now());

        let registration = merged.registration.unwrap();
        assert_eq!(
            registration.url.as_deref(),
            Some("https://x.example.com/reg; https://other.example.com/")
        );
        assert_eq!(registration.deadline.as_deref(), Some("2025-02-01"));
        assert_eq!(registration.prices, vec![json!("$500"), json!("$700")]);
        assert_eq!(
            merged.organizer,
            Some(json!({"name": "Org; Other", "website": "https://org.example.com"}))
        );
    }

    #[test]
    fn test_conflicting_scalars_keep_both_values() {
        let a = record(json!({
            "registration": {"url": "https://a.example.com/reg", "deadline": "2025-01-01"},
            "organizer": "Org A",
            "region": "US"
        }));
        let b = record(json!({
            "registration": {"url": "https://b.example.com/reg", "deadline": "2025-02-01"},
            "organizer": "Org B",
            "region": "Europe"
        }));
        let policy = MergePolicy::default();
        let merged = merge(&a, &b, &policy, now());

        let registration = merged.registration.clone().unwrap();
        assert_eq!(
            registration.url.as_deref(),
            Some("https://a.example.com/reg; https://b.example.com/reg")
        );
        assert_eq!(registration.deadline.as_deref(), Some("2025-01-01; 2025-02-01"));
        assert_eq!(merged.organizer, Some(json!("Org A; Org B")));
        assert_eq!(merged.extra.get("region"), Some(&json!("US; Europe")));

        // merging the same incoming record again changes nothing
        let again = merge(&merged, &b, &policy, now());
        assert_eq!(again, merged);
    }

    #[test]
    fn test_nested_organizer_conflicts_keep_both_values() {
        let a = record(json!({"organizer": {"name": "Org A", "contact": {"email": "a@example.com"}}}));
        let b = record(json!({"organizer": {"name": "Org B", "contact": {"email": "b@example.com"}}}));
        let merged = merge(&a, &b, &MergePolicy::default(), now());
        assert_eq!(
            merged.organizer,
            Some(json!({
                "name": "Org A; Org B",
                "contact": {"email": "a@example.com; b@example.com"}
            }))
        );
    }
}
