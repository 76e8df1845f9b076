// src/pipeline/repair.rs

//! Recovering event records from free-form model output.
//!
//! Model answers arrive wrapped in prose or code fences, truncated mid-way,
//! or structurally broken. [`parse_response`] is a pure function from that
//! text to a [`ParseOutcome`]; it never fails.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde_json::{Map, Value};

use super::validate::{Rejection, validate};
use crate::models::EventRecord;

/// Upper bound on truncation candidates tried per fragment.
const MAX_CUT_ATTEMPTS: usize = 256;

static EVENT_OBJECT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"event_name"\s*:"#).expect("valid event object pattern"));

/// What could be recovered from one model answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// At least one valid record
    Valid(Vec<EventRecord>),
    /// JSON was recovered but held no valid record
    Empty,
    /// Nothing JSON-like could be recovered
    Malformed(String),
}

impl ParseOutcome {
    pub fn records(self) -> Vec<EventRecord> {
        match self {
            Self::Valid(records) => records,
            Self::Empty | Self::Malformed(_) => Vec::new(),
        }
    }
}

/// Recover, validate and convert every event object in `text`.
pub fn parse_response(text: &str) -> ParseOutcome {
    let Some(objects) = recover_objects(text) else {
        return ParseOutcome::Malformed("no JSON array or object could be recovered".into());
    };

    let mut records = Vec::new();
    for object in objects {
        let name = object
            .get("event_name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        let checked = validate(&object).and_then(|()| {
            EventRecord::from_object(object).map_err(|e| Rejection::Malformed(e.to_string()))
        });
        match checked {
            Ok(record) => records.push(record),
            Err(reason) => debug!("Rejected candidate {:?}: {}", name, reason),
        }
    }

    if records.is_empty() {
        ParseOutcome::Empty
    } else {
        ParseOutcome::Valid(records)
    }
}

/// Candidate objects, trying each strategy in turn.
fn recover_objects(text: &str) -> Option<Vec<Map<String, Value>>> {
    if let Some(objects) = outer_array(text) {
        return Some(objects);
    }

    let scanned = scan_event_objects(text);
    if !scanned.is_empty() {
        debug!("Recovered {} event object(s) by scanning", scanned.len());
        return Some(scanned);
    }

    greedy_object(text)
}

/// The outermost array, if one starts before any object does.
fn outer_array(text: &str) -> Option<Vec<Map<String, Value>>> {
    let open = text.find('[')?;
    if text.find('{').is_some_and(|brace| brace < open) {
        return None;
    }

    let tail = &text[open..];
    let value = tail
        .rfind(']')
        .and_then(|close| serde_json::from_str::<Value>(&tail[..=close]).ok())
        .or_else(|| repair(tail))?;

    let Value::Array(items) = value else {
        return None;
    };
    if items.is_empty() {
        return Some(Vec::new());
    }
    let objects = into_objects(items);
    (!objects.is_empty()).then_some(objects)
}

/// Every object starting with `"event_name"`, bounded by bracket matching or
/// by the start of the next such object.
fn scan_event_objects(text: &str) -> Vec<Map<String, Value>> {
    let starts: Vec<usize> = EVENT_OBJECT_START
        .find_iter(text)
        .map(|m| m.start())
        .collect();

    let mut objects = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let segment = &text[start..end];
        let candidate = match matching_close(segment) {
            Some(close) => &segment[..=close],
            None => segment.trim_end().trim_end_matches(',').trim_end(),
        };
        if let Some(Value::Object(object)) = repair(candidate) {
            objects.push(object);
        }
    }
    objects
}

/// One object from the first `{` to the last `}`, unwrapping `{"events": [...]}`.
fn greedy_object(text: &str) -> Option<Vec<Map<String, Value>>> {
    let open = text.find('{')?;
    let tail = &text[open..];
    let value = tail
        .rfind('}')
        .and_then(|close| serde_json::from_str::<Value>(&tail[..=close]).ok())
        .or_else(|| repair(tail))?;

    let Value::Object(mut object) = value else {
        return None;
    };
    match object.remove("events") {
        Some(Value::Array(items)) => Some(into_objects(items)),
        Some(other) => {
            object.insert("events".into(), other);
            Some(vec![object])
        }
        None => Some(vec![object]),
    }
}

fn into_objects(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(object) => Some(object),
            _ => None,
        })
        .collect()
}

/// Repair a possibly truncated JSON fragment.
///
/// In order: parse as-is; append missing closers (dropping a dangling comma
/// or key); cut back to the last complete element and close; finally close
/// an unterminated string as well. List items nested in an object (speakers,
/// price tiers) are only ever kept whole.
pub fn repair(fragment: &str) -> Option<Value> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(fragment) {
        return Some(value);
    }
    if !ends_inside_list_item(fragment) {
        if let Some(value) = balance(fragment, false).and_then(|s| parse(&s)) {
            return Some(value);
        }
    }

    let cuts = cut_points(fragment);
    for &cut in cuts.iter().rev().take(MAX_CUT_ATTEMPTS) {
        if let Some(value) = balance(&fragment[..cut], false).and_then(|s| parse(&s)) {
            return Some(value);
        }
    }

    balance(fragment, true).and_then(|s| parse(&s))
}

fn parse(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate).ok()
}

/// Lexer state shared by the scanners below.
#[derive(Debug, Default)]
struct Scan {
    stack: Vec<char>,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    /// Feed one character. Returns `false` on a mismatched closer.
    fn feed(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return true;
        }
        match ch {
            '"' => self.in_string = true,
            '{' => self.stack.push('}'),
            '[' => self.stack.push(']'),
            '}' | ']' => {
                if self.stack.last() != Some(&ch) {
                    return false;
                }
                self.stack.pop();
            }
            _ => {}
        }
        true
    }

    /// Inside an object that sits in a list inside an object: a speaker or
    /// price tier.
    fn in_list_item(&self) -> bool {
        self.stack.ends_with(&['}', ']', '}'])
    }

    /// Whether a comma at this point separates members of a container whose
    /// partial content is safe to keep.
    fn comma_is_cut_point(&self) -> bool {
        match self.stack.last() {
            Some(']') => true,
            Some('}') => !self.in_list_item(),
            _ => false,
        }
    }
}

/// Whether `fragment` stops part-way through a list item nested in an
/// object, which closing alone would keep half-finished.
fn ends_inside_list_item(fragment: &str) -> bool {
    let mut scan = Scan::default();
    for ch in fragment.chars() {
        if !scan.feed(ch) {
            return false;
        }
    }
    scan.in_list_item()
}

/// Index of the `}` or `]` closing the container that opens `segment`.
fn matching_close(segment: &str) -> Option<usize> {
    let mut scan = Scan::default();
    for (i, ch) in segment.char_indices() {
        if !scan.feed(ch) {
            return None;
        }
        if !scan.in_string && matches!(ch, '}' | ']') && scan.stack.is_empty() {
            return Some(i);
        }
    }
    None
}

/// Byte offsets at which the fragment can be cut and closed without
/// keeping a partial value.
fn cut_points(fragment: &str) -> Vec<usize> {
    let mut scan = Scan::default();
    let mut cuts = Vec::new();
    for (i, ch) in fragment.char_indices() {
        let was_in_string = scan.in_string;
        if ch == ',' && !was_in_string && scan.comma_is_cut_point() {
            cuts.push(i);
        }
        if !scan.feed(ch) {
            break;
        }
        if !was_in_string && matches!(ch, '}' | ']') {
            cuts.push(i + ch.len_utf8());
        }
    }
    cuts
}

/// Close whatever is open at the end of `fragment`.
///
/// Without `close_strings`, a fragment ending inside a string is rejected.
fn balance(fragment: &str, close_strings: bool) -> Option<String> {
    let mut scan = Scan::default();
    for ch in fragment.chars() {
        if !scan.feed(ch) {
            return None;
        }
    }

    let mut out = fragment.to_string();
    if scan.in_string {
        if !close_strings {
            return None;
        }
        if scan.escaped {
            out.pop();
        }
        out.push('"');
    }

    drop_dangling(&mut out);
    out.extend(scan.stack.iter().rev());
    Some(out)
}

/// Strip a trailing comma or a `"key":` left without a value.
fn drop_dangling(out: &mut String) {
    loop {
        out.truncate(out.trim_end().len());
        if out.ends_with(',') {
            out.pop();
            continue;
        }
        if out.ends_with(':') {
            out.pop();
            out.truncate(out.trim_end().len());
            if out.ends_with('"') {
                if let Some(open) = key_start(out) {
                    out.truncate(open);
                }
            }
            continue;
        }
        break;
    }
}

/// Start of the string literal that ends `s` (which ends with `"`).
fn key_start(s: &str) -> Option<usize> {
    let body = &s[..s.len() - 1];
    let mut idx = body.len();
    while let Some(pos) = body[..idx].rfind('"') {
        let backslashes = body[..pos].chars().rev().take_while(|&c| c == '\\').count();
        if backslashes % 2 == 0 {
            return Some(pos);
        }
        idx = pos;
    }
    None
}
