//! Normalization of `sessions:index` into an ordered key list.
//!
//! The index has been written in three shapes over time: a list of full
//! keys, a JSON string holding an array of bare ids, and a set of full keys.
//! [`detect`] figures out which one is present and returns the first window
//! of keys; [`IndexShape::window`] reads further windows of the same shape.

use sonic_rs::{JsonValueTrait, Value};

use crate::models::session::{SESSION_INDEX_KEY, SESSION_KEY_PREFIX};
use crate::store::{KvStore, StoreError};

/// The representation `sessions:index` was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexShape {
    /// A Redis list, read window by window with `LRANGE`.
    List,
    /// A JSON array of ids, already prefixed into full keys.
    JsonArray(Vec<String>),
    /// A Redis set, sorted so offsets stay stable between calls.
    Set(Vec<String>),
}

impl IndexShape {
    pub fn name(&self) -> &'static str {
        match self {
            IndexShape::List => "list",
            IndexShape::JsonArray(_) => "json",
            IndexShape::Set(_) => "set",
        }
    }

    /// Reads up to `len` keys starting at `start`.
    pub async fn window(
        &self,
        store: &dyn KvStore,
        start: u64,
        len: usize,
    ) -> Result<Vec<String>, StoreError> {
        if len == 0 {
            return Ok(Vec::new());
        }

        match self {
            IndexShape::List => {
                let from = i64::try_from(start).unwrap_or(i64::MAX);
                let to = from.saturating_add(i64::try_from(len).unwrap_or(i64::MAX) - 1);
                store.list_range(SESSION_INDEX_KEY, from, to).await
            }
            IndexShape::JsonArray(keys) | IndexShape::Set(keys) => Ok(slice(keys, start, len)),
        }
    }
}

fn slice(keys: &[String], start: u64, len: usize) -> Vec<String> {
    let from = usize::try_from(start).unwrap_or(usize::MAX).min(keys.len());
    let to = from.saturating_add(len).min(keys.len());
    keys[from..to].to_vec()
}

/// Prefixes a bare id with `session:` unless it already carries it.
pub fn to_session_key(id: &str) -> String {
    if id.starts_with(SESSION_KEY_PREFIX) {
        id.to_string()
    } else {
        format!("{}{}", SESSION_KEY_PREFIX, id)
    }
}

/// Parses a JSON-string index. Strings and integers are accepted as ids;
/// anything else in the array is skipped. `None` when the value is not a
/// JSON array at all.
pub fn parse_json_index(raw: &str) -> Option<Vec<String>> {
    let array: Vec<Value> = sonic_rs::from_str(raw).ok()?;

    Some(
        array
            .iter()
            .filter_map(|item| {
                if let Some(s) = item.as_str() {
                    Some(s.trim().to_string())
                } else if let Some(n) = item.as_i64() {
                    Some(n.to_string())
                } else {
                    item.as_u64().map(|n| n.to_string())
                }
            })
            .filter(|id| !id.is_empty())
            .map(|id| to_session_key(&id))
            .collect(),
    )
}

/// Tries the index shapes in order and returns the detected shape with the
/// window `[start, start + limit)`.
///
/// A `WrongType` reply means "not this shape" and moves on to the next
/// shape. Any other store error is returned so the caller can abandon the
/// index. `Ok(None)` means no shape produced any keys for this window.
pub async fn detect(
    store: &dyn KvStore,
    start: u64,
    limit: usize,
) -> Result<Option<(IndexShape, Vec<String>)>, StoreError> {
    match IndexShape::List.window(store, start, limit).await {
        Ok(keys) if !keys.is_empty() => return Ok(Some((IndexShape::List, keys))),
        Ok(_) | Err(StoreError::WrongType) => {}
        Err(e) => return Err(e),
    }

    match store.get(SESSION_INDEX_KEY).await {
        Ok(Some(raw)) => match parse_json_index(&raw) {
            Some(keys) => {
                let shape = IndexShape::JsonArray(keys);
                let window = shape.window(store, start, limit).await?;
                if !window.is_empty() {
                    return Ok(Some((shape, window)));
                }
            }
            None => tracing::warn!("⚠️ {} holds a value that is not a JSON array", SESSION_INDEX_KEY),
        },
        Ok(None) | Err(StoreError::WrongType) => {}
        Err(e) => return Err(e),
    }

    match store.set_members(SESSION_INDEX_KEY).await {
        Ok(mut members) if !members.is_empty() => {
            members.sort();
            let shape = IndexShape::Set(members);
            let window = shape.window(store, start, limit).await?;
            if !window.is_empty() {
                return Ok(Some((shape, window)));
            }
        }
        Ok(_) | Err(StoreError::WrongType) => {}
        Err(e) => return Err(e),
    }

    Ok(None)
}
