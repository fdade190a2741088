use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Target type recorded for session actions.
pub const TARGET_SESSION: &str = "session";
/// An admin expired a session. Metadata carries `deleted`, or
/// `existed: false` when the session was already gone.
pub const ACTION_EXPIRE_SESSION: &str = "EXPIRE_SESSION";

/// One row of the `admin_actions` audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub admin_id: String,
    pub target_type: String,
    pub target_id: String,
    pub action: String,
    pub reason: Option<String>,
    pub metadata: Value,
    /// When the action was taken.
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn session(
        admin_id: &str,
        session_key: &str,
        action: &str,
        reason: Option<&str>,
        metadata: Value,
    ) -> Self {
        Self {
            admin_id: admin_id.to_string(),
            target_type: TARGET_SESSION.to_string(),
            target_id: session_key.to_string(),
            action: action.to_string(),
            reason: reason.map(str::to_string),
            metadata,
            created_at: Utc::now(),
        }
    }
}
