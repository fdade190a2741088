use crate::error::{AppError, Result};
use crate::models::session::{MAX_SESSION_KEY_LEN, SESSION_KEY_PREFIX};

/// Validates a session key before it reaches the store.
///
/// A valid key starts with `session:`, has a non-empty id, contains no
/// whitespace and is at most `MAX_SESSION_KEY_LEN` bytes long.
pub fn validate_session_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::Validation("Invalid sessionKey".to_string()));
    }

    let well_formed = key
        .strip_prefix(SESSION_KEY_PREFIX)
        .is_some_and(|id| !id.is_empty())
        && !key.chars().any(char::is_whitespace)
        && key.len() <= MAX_SESSION_KEY_LEN;

    if !well_formed {
        return Err(AppError::Validation("Invalid sessionKey format".to_string()));
    }

    Ok(())
}

/// Returns `true` when `key` passes [`validate_session_key`].
pub fn is_plausible_session_key(key: &str) -> bool {
    validate_session_key(key).is_ok()
}

/// Coerces a caller-supplied page size into `1..=max`.
pub fn normalize_limit(raw: Option<i64>, default: usize, max: usize) -> usize {
    match raw {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(max).min(max),
        _ => default,
    }
}

/// Checks that a caller-supplied SCAN cursor is an unsigned integer.
pub fn validate_scan_cursor(cursor: &str) -> Result<()> {
    if cursor.is_empty() || !cursor.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation("Invalid cursor".to_string()));
    }
    Ok(())
}

/// Trims and lower-cases a search term, rejecting blank input.
pub fn normalize_search_query(raw: Option<&str>) -> Result<String> {
    let term = raw.unwrap_or_default().trim().to_lowercase();
    if term.is_empty() {
        return Err(AppError::Validation("Query parameter is required".to_string()));
    }
    Ok(term)
}
