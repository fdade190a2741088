use serde::Serialize;

/// Prefix of every session record key.
pub const SESSION_KEY_PREFIX: &str = "session:";
/// `SCAN MATCH` pattern covering the session namespace.
pub const SESSION_KEY_PATTERN: &str = "session:*";
/// The advisory secondary index over session keys.
pub const SESSION_INDEX_KEY: &str = "sessions:index";
/// Longest key accepted by the single-session operations.
pub const MAX_SESSION_KEY_LEN: usize = 200;

/// Default page size for `list_sessions`.
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// Hard cap on the page size for `list_sessions`.
pub const MAX_LIST_LIMIT: usize = 100;

/// A normalized, read-only view of one session record.
///
/// Fields that could not be resolved from the payload serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// The full `session:<id>` key.
    pub session_key: String,
    /// The owning user, from the first matching payload path.
    pub user_id: Option<String>,
    /// The trip destination name.
    pub destination: Option<String>,
    /// The trip budget, if numeric.
    pub budget: Option<f64>,
    /// Creation timestamp as written by the session issuer, unvalidated.
    pub created_at: Option<String>,
    /// Remaining time to live, absent when the key has no expiry.
    pub ttl_seconds: Option<u64>,
}

/// A single session as returned to an admin inspecting it: the summary plus
/// the parsed payload, `null` when the stored value is not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub raw: Option<sonic_rs::Value>,
}

/// Where the next page of `list_sessions` starts.
///
/// Serializes as a number for index pagination and as a string for a
/// store-native scan cursor, where `"0"` means the namespace is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NextCursor {
    /// Offset into `sessions:index`.
    Offset(u64),
    /// SCAN cursor returned by the store.
    Scan(String),
}

/// One page of sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsResult {
    pub sessions: Vec<SessionSummary>,
    pub next_cursor: NextCursor,
}

/// Matches for an admin search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSessionsResult {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
    pub query: String,
}

/// Outcome of an administrative expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpireOutcome {
    pub deleted: bool,
    pub existed: bool,
}

/// Options for `list_sessions`. Build with [`ListOptions::default`] and the
/// `with_*` helpers so the limit is always normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Try `sessions:index` before scanning.
    pub use_index: bool,
    /// Zero-based offset into the index. Ignored in scan mode.
    pub start: u64,
    /// Page size. `0` selects `DEFAULT_LIST_LIMIT`, larger values are capped
    /// at `MAX_LIST_LIMIT`.
    pub limit: usize,
    /// SCAN cursor to resume from, `"0"` for the start of the namespace.
    pub scan_cursor: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            use_index: true,
            start: 0,
            limit: DEFAULT_LIST_LIMIT,
            scan_cursor: "0".to_string(),
        }
    }
}

impl ListOptions {
    pub fn with_index(mut self, use_index: bool) -> Self {
        self.use_index = use_index;
        self
    }

    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Sets the page size; zero, negative and missing values fall back to
    /// the default, anything above the cap is clamped.
    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = crate::validation::session::normalize_limit(
            limit,
            DEFAULT_LIST_LIMIT,
            MAX_LIST_LIMIT,
        );
        self
    }

    pub fn with_scan_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.scan_cursor = cursor.into();
        self
    }
}
