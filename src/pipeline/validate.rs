// src/pipeline/validate.rs

//! Candidate record validity rule.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::is_empty_value;

/// Fields of which at least one must be present for a real event.
pub const DETAIL_FIELDS: [&str; 5] = ["dates", "location", "description", "topics", "registration"];

const SPEAKER_FIELDS: [&str; 3] = ["name", "title", "organization"];

/// Why a parsed object was not accepted as an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing event_name")]
    MissingName,

    #[error("looks like a speaker entry")]
    SpeakerEntry,

    #[error("no event details (dates, location, description, topics, registration)")]
    NoEventDetails,

    #[error("unreadable record: {0}")]
    Malformed(String),
}

fn populated(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).is_some_and(|v| !is_empty_value(v))
}

/// Accept an object with a non-empty `event_name` and at least one detail
/// field. Emptiness is recursive.
pub fn validate(object: &Map<String, Value>) -> Result<(), Rejection> {
    if !populated(object, "event_name") {
        return Err(Rejection::MissingName);
    }
    if DETAIL_FIELDS.iter().any(|key| populated(object, key)) {
        return Ok(());
    }
    if SPEAKER_FIELDS.iter().any(|key| populated(object, key)) {
        return Err(Rejection::SpeakerEntry);
    }
    Err(Rejection::NoEventDetails)
}
