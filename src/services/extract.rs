//! Field extraction from session payloads.
//!
//! Session writers have moved fields around over time, so every logical
//! field has an ordered list of candidate paths. Identity and timestamp
//! fields take the first candidate holding a string. Destination and budget
//! take the first candidate holding any non-null value and then check its
//! type, so a malformed `travel` entry hides the top-level one.

use sonic_rs::{JsonValueTrait, Value};

use crate::models::session::SessionSummary;

type FieldPath = &'static [&'static str];

const USER_ID_PATHS: &[FieldPath] = &[
    &["static", "clerkUserId"],
    &["static_attributes", "clerkUserId"],
    &["userId"],
];

const DESTINATION_PATHS: &[FieldPath] = &[&["travel", "destination"], &["destination"]];

const BUDGET_PATHS: &[FieldPath] = &[&["travel", "budget"], &["budget"]];

const CREATED_AT_PATHS: &[FieldPath] = &[&["createdAt"], &["created_at"]];

/// Parses a raw session value, `None` when it is not valid JSON.
pub fn parse_raw(raw: &str) -> Option<Value> {
    match sonic_rs::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Unparsable session payload: {}", e);
            None
        }
    }
}

/// Parses a raw session value. Anything that is not valid JSON becomes an
/// empty object so the session is still listed.
pub fn parse_payload(raw: &str) -> Value {
    parse_raw(raw).unwrap_or_else(|| sonic_rs::json!({}))
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |node, segment| node.get(*segment))
}

fn first_hit<'a, T>(
    payload: &'a Value,
    paths: &[FieldPath],
    accept: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    paths
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(accept)
}

fn first_present<'a>(payload: &'a Value, paths: &[FieldPath]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find(|v| !v.is_null())
}

pub fn user_id(payload: &Value) -> Option<String> {
    first_hit(payload, USER_ID_PATHS, |v| v.as_str().map(str::to_string))
}

/// A destination is either a plain string or an object with a string `name`.
pub fn destination(payload: &Value) -> Option<String> {
    let v = first_present(payload, DESTINATION_PATHS)?;
    v.as_str()
        .or_else(|| v.get("name").and_then(|name| name.as_str()))
        .map(str::to_string)
}

pub fn budget(payload: &Value) -> Option<f64> {
    first_present(payload, BUDGET_PATHS).filter(|v| v.is_number())?.as_f64()
}

pub fn created_at(payload: &Value) -> Option<String> {
    first_hit(payload, CREATED_AT_PATHS, |v| v.as_str().map(str::to_string))
}

/// Builds the summary for `key`. Negative TTL replies (no expiry, missing)
/// are dropped.
pub fn summarize(key: &str, payload: &Value, ttl: Option<i64>) -> SessionSummary {
    SessionSummary {
        session_key: key.to_string(),
        user_id: user_id(payload),
        destination: destination(payload),
        budget: budget(payload),
        created_at: created_at(payload),
        ttl_seconds: ttl.and_then(|t| u64::try_from(t).ok()),
    }
}
