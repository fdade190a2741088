use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::error::Result;
use crate::models::audit::{ACTION_EXPIRE_SESSION, AuditEntry};
use crate::models::session::{
    DEFAULT_LIST_LIMIT, ExpireOutcome, ListOptions, ListSessionsResult, MAX_LIST_LIMIT, NextCursor,
    SESSION_INDEX_KEY, SESSION_KEY_PATTERN, SearchSessionsResult, SessionDetail, SessionSummary,
};
use crate::services::audit::AuditSink;
use crate::services::{extract, index};
use crate::store::{KvStore, StoreError};
use crate::validation::session::{
    is_plausible_session_key, normalize_limit, normalize_search_query, validate_scan_cursor,
    validate_session_key,
};

/// Upper bound on index windows read by one `list_sessions` call while
/// replacing stale entries.
pub const MAX_INDEX_WINDOWS: usize = 5;
/// Smallest `COUNT` hint sent with a listing scan.
pub const MIN_SCAN_BATCH: usize = 50;
/// `COUNT` hint for each scan issued by a search.
pub const SEARCH_SCAN_BATCH: usize = 100;
/// A search stops scanning once it has collected this many keys.
pub const SEARCH_KEY_CEILING: usize = 500;
pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 200;

/// Read and expire access to the session namespace.
///
/// `sessions:index` is only a hint. Listing prefers it and silently drops
/// entries that no longer resolve; when it is missing, empty or unreadable
/// the registry scans `session:*` instead.
///
/// Ordering across pages is not guaranteed while writers are active: both
/// index offsets and scan cursors walk a key space that can change under
/// them.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn KvStore>,
    audit: Arc<dyn AuditSink>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn KvStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// Returns one page of sessions.
    ///
    /// Only a failing scan is reported as an error. Index trouble falls back
    /// to the scan path and individual unreadable keys are skipped.
    pub async fn list_sessions(&self, options: ListOptions) -> Result<ListSessionsResult> {
        let limit = match options.limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        };

        if options.use_index {
            match self.list_from_index(options.start, limit).await {
                Ok(Some(page)) => return Ok(page),
                Ok(None) => {
                    tracing::debug!("{} has no entries for this window, scanning", SESSION_INDEX_KEY);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} read failed, falling back to SCAN: {}", SESSION_INDEX_KEY, e);
                }
            }
        }

        self.list_from_scan(&options.scan_cursor, limit).await
    }

    async fn list_from_index(
        &self,
        start: u64,
        limit: usize,
    ) -> std::result::Result<Option<ListSessionsResult>, StoreError> {
        let Some((shape, mut window)) = index::detect(self.store(), start, limit).await? else {
            return Ok(None);
        };

        tracing::debug!("📇 Listing sessions from {} index at offset {}", shape.name(), start);

        let mut sessions = Vec::with_capacity(limit);
        let mut seen = HashSet::new();
        let mut consulted: u64 = 0;
        let mut requested = limit;
        let mut windows = 1;

        loop {
            consulted += window.len() as u64;
            let exhausted = window.len() < requested;

            for key in &window {
                if !seen.insert(key.clone()) {
                    continue;
                }
                if let Some(summary) = self.resolve_for_listing(key).await {
                    sessions.push(summary);
                }
            }

            let missing = limit.saturating_sub(sessions.len());
            if missing == 0 || exhausted || windows >= MAX_INDEX_WINDOWS {
                break;
            }

            requested = missing;
            window = match shape.window(self.store(), start + consulted, requested).await {
                Ok(next) if !next.is_empty() => next,
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!("⚠️ {} refill read failed, returning partial page: {}", SESSION_INDEX_KEY, e);
                    break;
                }
            };
            windows += 1;
        }

        Ok(Some(ListSessionsResult {
            sessions,
            next_cursor: NextCursor::Offset(start + consulted),
        }))
    }

    /// One scan round trip; the returned cursor is passed through verbatim.
    async fn list_from_scan(&self, cursor: &str, limit: usize) -> Result<ListSessionsResult> {
        validate_scan_cursor(cursor)?;
        let count = MIN_SCAN_BATCH.max(limit * 3);
        let page = self.store.scan(cursor, SESSION_KEY_PATTERN, count).await?;

        tracing::debug!("🔎 SCAN from cursor {} returned {} keys", cursor, page.keys.len());

        let mut sessions = Vec::with_capacity(limit.min(page.keys.len()));
        let mut seen = HashSet::new();

        for key in &page.keys {
            if sessions.len() >= limit {
                break;
            }
            if !seen.insert(key.as_str()) {
                continue;
            }
            if let Some(summary) = self.resolve_for_listing(key).await {
                sessions.push(summary);
            }
        }

        Ok(ListSessionsResult {
            sessions,
            next_cursor: NextCursor::Scan(page.cursor),
        })
    }

    /// Returns one session with its parsed payload, or `None` when the key is
    /// malformed or gone.
    pub async fn get_session(&self, key: &str) -> Result<Option<SessionDetail>> {
        if !is_plausible_session_key(key) {
            tracing::debug!("Rejecting implausible session key: {:?}", key);
            return Ok(None);
        }

        let Some(raw) = self.read_value(key).await? else {
            return Ok(None);
        };

        let parsed = extract::parse_raw(&raw);
        let payload = parsed.clone().unwrap_or_else(|| sonic_rs::json!({}));
        let ttl = self.read_ttl(key).await;

        Ok(Some(SessionDetail {
            summary: extract::summarize(key, &payload, ttl),
            raw: parsed,
        }))
    }

    /// Deletes a session on behalf of `admin_id`.
    ///
    /// The existence check and the delete propagate store failures. Index
    /// maintenance and audit logging are best effort.
    pub async fn expire_session(
        &self,
        key: &str,
        admin_id: &str,
        reason: Option<&str>,
    ) -> Result<ExpireOutcome> {
        validate_session_key(key)?;

        if !self.store.exists(key).await? {
            tracing::info!("Expire requested for missing session {} by {}", key, admin_id);
            self.record_audit(AuditEntry::session(
                admin_id,
                key,
                ACTION_EXPIRE_SESSION,
                reason,
                json!({ "existed": false }),
            ))
            .await;
            return Ok(ExpireOutcome { deleted: false, existed: false });
        }

        let removed = self.store.del(key).await?;
        let deleted = removed > 0;

        self.prune_index(key).await;

        self.record_audit(AuditEntry::session(
            admin_id,
            key,
            ACTION_EXPIRE_SESSION,
            reason,
            json!({ "deleted": deleted }),
        ))
        .await;

        tracing::info!("🗑️ Session {} expired by {} (deleted: {})", key, admin_id, deleted);
        Ok(ExpireOutcome { deleted, existed: true })
    }

    /// Finds sessions whose key, user id or destination contains `query`,
    /// case-insensitively.
    pub async fn search_sessions(
        &self,
        query: Option<&str>,
        limit: Option<i64>,
    ) -> Result<SearchSessionsResult> {
        let term = normalize_search_query(query)?;
        let limit = normalize_limit(limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);

        let mut keys = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let page = self.store.scan(&cursor, SESSION_KEY_PATTERN, SEARCH_SCAN_BATCH).await?;
            keys.extend(page.keys);
            cursor = page.cursor;
            if cursor == "0" || keys.len() >= SEARCH_KEY_CEILING {
                break;
            }
        }

        tracing::debug!("🔎 Searching {} session keys for {:?}", keys.len(), term);

        let mut seen = HashSet::new();
        let mut sessions = Vec::new();

        for key in &keys {
            if sessions.len() >= limit {
                break;
            }
            if !seen.insert(key.as_str()) {
                continue;
            }

            let raw = match self.store.get(key).await {
                Ok(Some(raw)) => raw,
                Ok(None) | Err(StoreError::WrongType) => continue,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to read {} during search: {}", key, e);
                    continue;
                }
            };

            let payload = extract::parse_payload(&raw);
            let contains = |field: Option<String>| {
                field.is_some_and(|value| value.to_lowercase().contains(&term))
            };

            if key.to_lowercase().contains(&term)
                || contains(extract::user_id(&payload))
                || contains(extract::destination(&payload))
            {
                let ttl = self.read_ttl(key).await;
                sessions.push(extract::summarize(key, &payload, ttl));
            }
        }

        tracing::info!("🔎 Session search for {:?} matched {} sessions", term, sessions.len());

        Ok(SearchSessionsResult {
            total: sessions.len(),
            sessions,
            query: term,
        })
    }

    /// GET + TTL for one key. A missing key, or one holding something other
    /// than a string, resolves to `None`.
    async fn resolve(&self, key: &str) -> std::result::Result<Option<SessionSummary>, StoreError> {
        let Some(raw) = self.read_value(key).await? else {
            return Ok(None);
        };

        let payload = extract::parse_payload(&raw);
        let ttl = self.read_ttl(key).await;
        Ok(Some(extract::summarize(key, &payload, ttl)))
    }

    /// GET that treats a key holding a non-string value as absent.
    async fn read_value(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        match self.store.get(key).await {
            Ok(value) => Ok(value),
            Err(StoreError::WrongType) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn resolve_for_listing(&self, key: &str) -> Option<SessionSummary> {
        match self.resolve(key).await {
            Ok(Some(summary)) => Some(summary),
            Ok(None) => {
                tracing::debug!("Skipping stale session key {}", key);
                None
            }
            Err(e) => {
                tracing::warn!("⚠️ Skipping unreadable session {}: {}", key, e);
                None
            }
        }
    }

    async fn read_ttl(&self, key: &str) -> Option<i64> {
        match self.store.ttl(key).await {
            Ok(ttl) => Some(ttl),
            Err(e) => {
                tracing::warn!("⚠️ TTL lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Removes `key` from both the list and the set form of the index.
    /// A JSON-string index is left alone and goes stale.
    async fn prune_index(&self, key: &str) {
        match self.store.list_remove(SESSION_INDEX_KEY, 0, key).await {
            Ok(removed) if removed > 0 => tracing::debug!("📇 Removed {} from index list", key),
            Ok(_) | Err(StoreError::WrongType) => {}
            Err(e) => tracing::warn!("⚠️ Failed to update {} (list): {}", SESSION_INDEX_KEY, e),
        }

        match self.store.set_remove(SESSION_INDEX_KEY, key).await {
            Ok(removed) if removed > 0 => tracing::debug!("📇 Removed {} from index set", key),
            Ok(_) | Err(StoreError::WrongType) => {}
            Err(e) => tracing::warn!("⚠️ Failed to update {} (set): {}", SESSION_INDEX_KEY, e),
        }
    }

    async fn record_audit(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.audit.record(entry).await {
            tracing::error!("❌ Failed to record audit entry {}: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::audit::AuditError;
    use crate::store::MemoryStore;
    use crate::store::memory::Op;
    use async_trait::async_trait;
    use sonic_rs::JsonValueTrait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<AuditEntry>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        fn entries(&self) -> Vec<AuditEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, entry: AuditEntry) -> std::result::Result<(), AuditError> {
            if self.fail {
                return Err(AuditError::Pool("audit database unreachable".to_string()));
            }
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<RecordingSink>, SessionRegistry) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let registry = SessionRegistry::new(store.clone(), sink.clone());
        (store, sink, registry)
    }

    fn keys(page: &ListSessionsResult) -> Vec<&str> {
        page.sessions.iter().map(|s| s.session_key.as_str()).collect()
    }

    fn sorted(mut keys: Vec<&str>) -> Vec<&str> {
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn index_list_scenario() {
        let (store, _, registry) = setup();
        for key in ["session:a", "session:b", "session:c"] {
            store.set(key, r#"{"userId":"u"}"#);
            store.list_push(SESSION_INDEX_KEY, key);
        }

        let page = registry
            .list_sessions(ListOptions::default().with_limit(Some(2)))
            .await
            .unwrap();

        assert_eq!(keys(&page), vec!["session:a", "session:b"]);
        assert_eq!(page.next_cursor, NextCursor::Offset(2));
    }

    #[tokio::test]
    async fn scan_without_index_scenario() {
        let (store, _, registry) = setup();
        store.set("session:x", "{}");
        store.set("session:y", "{}");

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();

        assert_eq!(sorted(keys(&page)), vec!["session:x", "session:y"]);
        assert_eq!(page.next_cursor, NextCursor::Scan("0".to_string()));
    }

    #[tokio::test]
    async fn stale_index_entries_are_dropped_and_replaced() {
        let (store, _, registry) = setup();
        for key in ["session:a", "session:gone", "session:b", "session:c"] {
            store.list_push(SESSION_INDEX_KEY, key);
        }
        store.set("session:a", "{}");
        store.set("session:b", "{}");
        store.set("session:c", "{}");
        store.set_with_ttl("session:gone", "{}", Duration::ZERO);

        let page = registry
            .list_sessions(ListOptions::default().with_limit(Some(2)))
            .await
            .unwrap();

        assert_eq!(keys(&page), vec!["session:a", "session:b"]);
        assert_eq!(page.next_cursor, NextCursor::Offset(3));

        let rest = registry
            .list_sessions(ListOptions::default().with_start(3).with_limit(Some(2)))
            .await
            .unwrap();
        assert_eq!(keys(&rest), vec!["session:c"]);
        assert_eq!(rest.next_cursor, NextCursor::Offset(4));
    }

    #[tokio::test]
    async fn all_stale_window_returns_empty_page() {
        let (store, _, registry) = setup();
        store.list_push(SESSION_INDEX_KEY, "session:old1");
        store.list_push(SESSION_INDEX_KEY, "session:old2");
        store.set("session:live", "{}");

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        assert!(page.sessions.is_empty());
        assert_eq!(page.next_cursor, NextCursor::Offset(2));
    }

    #[tokio::test]
    async fn duplicate_index_entries_are_listed_once() {
        let (store, _, registry) = setup();
        for key in ["session:a", "session:a", "session:b"] {
            store.list_push(SESSION_INDEX_KEY, key);
        }
        store.set("session:a", "{}");
        store.set("session:b", "{}");

        let page = registry
            .list_sessions(ListOptions::default().with_limit(Some(2)))
            .await
            .unwrap();
        assert_eq!(keys(&page), vec!["session:a", "session:b"]);
        assert_eq!(page.next_cursor, NextCursor::Offset(3));
    }

    #[tokio::test]
    async fn index_and_scan_agree_on_a_consistent_snapshot() {
        let (store, _, registry) = setup();
        let live = ["session:1", "session:2", "session:3", "session:4"];
        for key in live {
            store.set(key, "{}");
        }
        for key in live.iter().rev() {
            store.list_push(SESSION_INDEX_KEY, key);
        }

        let via_index = registry.list_sessions(ListOptions::default()).await.unwrap();
        let via_scan = registry
            .list_sessions(ListOptions::default().with_index(false))
            .await
            .unwrap();

        assert_eq!(keys(&via_index), vec!["session:4", "session:3", "session:2", "session:1"]);
        assert_eq!(sorted(keys(&via_index)), sorted(keys(&via_scan)));
    }

    #[tokio::test]
    async fn json_and_set_indexes_are_followed() {
        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.set("session:b", "{}");
        store.set(SESSION_INDEX_KEY, r#"["b","session:a","zzz"]"#);

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        assert_eq!(keys(&page), vec!["session:b", "session:a"]);
        assert_eq!(page.next_cursor, NextCursor::Offset(3));

        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.set("session:b", "{}");
        store.set_add(SESSION_INDEX_KEY, "session:b");
        store.set_add(SESSION_INDEX_KEY, "session:a");

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        assert_eq!(keys(&page), vec!["session:a", "session:b"]);
    }

    #[tokio::test]
    async fn broken_index_degrades_to_scan() {
        for garbage in [None, Some("not json"), Some(r#"{"not":"an array"}"#), Some("[]")] {
            let (store, _, registry) = setup();
            store.set("session:p", r#"{"destination":"Paris"}"#);
            store.set("session:q", "{}");
            if let Some(value) = garbage {
                store.set(SESSION_INDEX_KEY, value);
            }

            let with_index = registry.list_sessions(ListOptions::default()).await.unwrap();
            let without = registry
                .list_sessions(ListOptions::default().with_index(false))
                .await
                .unwrap();

            assert_eq!(with_index, without, "index value {garbage:?}");
        }
    }

    #[tokio::test]
    async fn index_read_failure_falls_back_to_scan() {
        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.list_push(SESSION_INDEX_KEY, "session:a");
        store.fail(Op::ListRange);

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        assert_eq!(keys(&page), vec!["session:a"]);
        assert_eq!(page.next_cursor, NextCursor::Scan("0".to_string()));
    }

    #[tokio::test]
    async fn scan_failure_is_reported() {
        let (store, _, registry) = setup();
        store.fail(Op::Scan);

        let err = registry
            .list_sessions(ListOptions::default().with_index(false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn corrupt_payload_is_still_listed() {
        let (store, _, registry) = setup();
        store.set_with_ttl("session:bad", "not json", Duration::from_secs(120));

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        let session = &page.sessions[0];
        assert_eq!(session.session_key, "session:bad");
        assert_eq!(session.user_id, None);
        assert_eq!(session.destination, None);
        assert_eq!(session.budget, None);
        assert_eq!(session.created_at, None);
        assert_eq!(session.ttl_seconds, Some(120));
    }

    #[tokio::test]
    async fn ttl_failure_only_drops_the_ttl() {
        let (store, _, registry) = setup();
        store.set_with_ttl("session:a", r#"{"userId":"u1"}"#, Duration::from_secs(60));
        store.fail(Op::Ttl);

        let page = registry.list_sessions(ListOptions::default()).await.unwrap();
        assert_eq!(page.sessions[0].user_id.as_deref(), Some("u1"));
        assert_eq!(page.sessions[0].ttl_seconds, None);
    }

    #[tokio::test]
    async fn unreadable_keys_are_skipped_in_listing() {
        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.list_push("session:weird", "not-a-string-value");

        let page = registry
            .list_sessions(ListOptions::default().with_index(false))
            .await
            .unwrap();
        assert_eq!(keys(&page), vec!["session:a"]);
    }

    #[tokio::test]
    async fn limit_is_capped() {
        let (store, _, registry) = setup();
        for i in 0..150 {
            store.set(&format!("session:{i:03}"), "{}");
        }

        let options = ListOptions::default().with_index(false).with_limit(Some(10_000));
        assert_eq!(options.limit, 100);

        let page = registry.list_sessions(options).await.unwrap();
        assert_eq!(page.sessions.len(), 100);
    }

    #[tokio::test]
    async fn zero_limit_uses_the_default_page_size() {
        let (store, _, registry) = setup();
        for i in 0..30 {
            store.set(&format!("session:{i:02}"), "{}");
        }

        let options = ListOptions { limit: 0, ..ListOptions::default() }.with_index(false);
        let page = registry.list_sessions(options).await.unwrap();
        assert_eq!(page.sessions.len(), DEFAULT_LIST_LIMIT);
    }

    #[tokio::test]
    async fn refill_stops_after_bounded_windows() {
        let (store, _, registry) = setup();
        for i in 0..12 {
            store.list_push(SESSION_INDEX_KEY, &format!("session:stale{i:02}"));
        }
        store.list_push(SESSION_INDEX_KEY, "session:live");
        store.set("session:live", "{}");

        let page = registry
            .list_sessions(ListOptions::default().with_limit(Some(2)))
            .await
            .unwrap();
        assert!(page.sessions.is_empty());
        assert_eq!(page.next_cursor, NextCursor::Offset((MAX_INDEX_WINDOWS * 2) as u64));

        let next = registry
            .list_sessions(ListOptions::default().with_start(10).with_limit(Some(2)))
            .await
            .unwrap();
        assert_eq!(keys(&next), vec!["session:live"]);
        assert_eq!(next.next_cursor, NextCursor::Offset(13));
    }

    #[tokio::test]
    async fn rejects_malformed_scan_cursor() {
        let (store, _, registry) = setup();
        store.set("session:a", "{}");

        let err = registry
            .list_sessions(ListOptions::default().with_index(false).with_scan_cursor("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn scan_stops_at_limit_and_returns_store_cursor() {
        let (store, _, registry) = setup();
        for i in 0..120 {
            store.set(&format!("session:{i:03}"), "{}");
        }

        let page = registry
            .list_sessions(ListOptions::default().with_index(false).with_limit(Some(5)))
            .await
            .unwrap();

        assert_eq!(page.sessions.len(), 5);
        assert_eq!(page.next_cursor, NextCursor::Scan("50".to_string()));
    }

    #[tokio::test]
    async fn get_session_resolves_fields() {
        let (store, _, registry) = setup();
        store.set_with_ttl(
            "session:abc",
            r#"{"static":{"clerkUserId":"A"},"userId":"B","travel":{"destination":{"name":"Tokyo"},"budget":2500},"createdAt":"2025-09-01T00:00:00Z"}"#,
            Duration::from_secs(300),
        );

        let detail = registry.get_session("session:abc").await.unwrap().unwrap();
        let raw = detail.raw.as_ref().unwrap();
        assert_eq!(raw.get("userId").and_then(|v| v.as_str()), Some("B"));
        let session = detail.summary;
        assert_eq!(session.user_id.as_deref(), Some("A"));
        assert_eq!(session.destination.as_deref(), Some("Tokyo"));
        assert_eq!(session.budget, Some(2500.0));
        assert_eq!(session.created_at.as_deref(), Some("2025-09-01T00:00:00Z"));
        assert_eq!(session.ttl_seconds, Some(300));
    }

    #[tokio::test]
    async fn get_session_raw_is_null_for_corrupt_payload() {
        let (store, _, registry) = setup();
        store.set("session:bad", "{not json");

        let detail = registry.get_session("session:bad").await.unwrap().unwrap();
        assert_eq!(detail.raw, None);
        assert_eq!(detail.summary.session_key, "session:bad");
        assert_eq!(detail.summary.user_id, None);
    }

    #[tokio::test]
    async fn get_session_absent_for_malformed_or_missing() {
        let (store, _, registry) = setup();
        store.set("sessions:index", "[]");

        assert_eq!(registry.get_session("sessions:index").await.unwrap(), None);
        assert_eq!(registry.get_session("session:has space").await.unwrap(), None);
        assert_eq!(registry.get_session("session:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_session_propagates_store_failure() {
        let (store, _, registry) = setup();
        store.fail(Op::Get);
        assert!(registry.get_session("session:a").await.is_err());
    }

    #[tokio::test]
    async fn expire_is_idempotent() {
        let (store, sink, registry) = setup();
        store.set("session:a", "{}");

        let first = registry.expire_session("session:a", "admin-1", Some("abuse")).await.unwrap();
        assert_eq!(first, ExpireOutcome { deleted: true, existed: true });

        let second = registry.expire_session("session:a", "admin-1", None).await.unwrap();
        assert_eq!(second, ExpireOutcome { deleted: false, existed: false });

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ACTION_EXPIRE_SESSION);
        assert_eq!(entries[0].reason.as_deref(), Some("abuse"));
        assert_eq!(entries[0].metadata, json!({ "deleted": true }));
        assert_eq!(entries[1].action, ACTION_EXPIRE_SESSION);
        assert_eq!(entries[1].metadata, json!({ "existed": false }));
        assert_eq!(entries[1].target_id, "session:a");
    }

    #[tokio::test]
    async fn expire_prunes_list_and_set_indexes() {
        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.set("session:b", "{}");
        store.list_push(SESSION_INDEX_KEY, "session:a");
        store.list_push(SESSION_INDEX_KEY, "session:b");

        registry.expire_session("session:a", "admin", None).await.unwrap();
        assert_eq!(
            store.list_range(SESSION_INDEX_KEY, 0, -1).await.unwrap(),
            vec!["session:b"]
        );

        let (store, _, registry) = setup();
        store.set("session:a", "{}");
        store.set_add(SESSION_INDEX_KEY, "session:a");
        store.set_add(SESSION_INDEX_KEY, "session:b");

        registry.expire_session("session:a", "admin", None).await.unwrap();
        assert_eq!(store.set_members(SESSION_INDEX_KEY).await.unwrap(), vec!["session:b"]);
    }

    #[tokio::test]
    async fn expire_tolerates_index_and_audit_failures() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(store.clone(), Arc::new(RecordingSink::failing()));
        store.set("session:a", "{}");
        store.fail(Op::ListRemove);
        store.fail(Op::SetRemove);

        let outcome = registry.expire_session("session:a", "admin", None).await.unwrap();
        assert_eq!(outcome, ExpireOutcome { deleted: true, existed: true });
        assert!(!store.exists("session:a").await.unwrap());
    }

    #[tokio::test]
    async fn expire_rejects_malformed_keys_before_touching_the_store() {
        let (store, sink, registry) = setup();
        store.fail(Op::Exists);

        let err = registry.expire_session("user:1", "admin", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn expire_propagates_primary_store_failures() {
        let (store, sink, registry) = setup();
        store.set("session:a", "{}");
        store.fail(Op::Del);

        let err = registry.expire_session("session:a", "admin", None).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn search_matches_key_user_and_destination() {
        let (store, _, registry) = setup();
        store.set("session:alpha", r#"{"userId":"user_123"}"#);
        store.set("session:beta", r#"{"travel":{"destination":{"name":"Paris"}}}"#);
        store.set("session:gamma", r#"{"static":{"clerkUserId":"user_PARIS_fan"}}"#);
        store.set("session:delta", r#"{"destination":"Rome"}"#);

        let result = registry.search_sessions(Some("  paris "), None).await.unwrap();
        let mut found: Vec<_> = result.sessions.iter().map(|s| s.session_key.as_str()).collect();
        found.sort();
        assert_eq!(found, vec!["session:beta", "session:gamma"]);
        assert_eq!(result.total, 2);
        assert_eq!(result.query, "paris");

        let by_key = registry.search_sessions(Some("ALPHA"), None).await.unwrap();
        assert_eq!(by_key.total, 1);
    }

    #[tokio::test]
    async fn search_requires_a_term_and_respects_limit() {
        let (store, _, registry) = setup();
        for i in 0..10 {
            store.set(&format!("session:trip{i}"), "{}");
        }

        assert!(matches!(
            registry.search_sessions(Some("   "), None).await,
            Err(AppError::Validation(_))
        ));

        let limited = registry.search_sessions(Some("trip"), Some(3)).await.unwrap();
        assert_eq!(limited.total, 3);
    }

    #[tokio::test]
    async fn search_stops_scanning_at_the_key_ceiling() {
        let (store, _, registry) = setup();
        for i in 0..700 {
            let payload = if i == 10 || i >= 550 { r#"{"destination":"Oslo"}"# } else { "{}" };
            store.set(&format!("session:{i:04}"), payload);
        }

        let result = registry.search_sessions(Some("oslo"), Some(200)).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.sessions[0].session_key, "session:0010");

        let all = registry.search_sessions(Some("session:"), Some(200)).await.unwrap();
        assert_eq!(all.total, 200);
    }
}
