use async_trait::async_trait;
use deadpool_postgres::Pool;
use thiserror::Error;

use crate::models::audit::AuditEntry;

/// Errors raised while writing an audit entry.
#[derive(Error, Debug)]
pub enum AuditError {
    /// No connection could be checked out of the pool.
    #[error("Audit pool error: {0}")]
    Pool(String),

    /// The insert itself failed.
    #[error("Audit insert error: {0}")]
    Insert(#[from] tokio_postgres::Error),
}

/// Destination for admin audit entries.
///
/// Callers treat every error as non-fatal: the action being audited has
/// already happened by the time the entry is written.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Writes entries to the `admin_actions` table.
pub struct PgAuditSink {
    pool: Pool,
}

impl PgAuditSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| AuditError::Pool(e.to_string()))?;

        client
            .execute(
                r#"
                INSERT INTO admin_actions (admin_id, target_type, target_id, action, reason, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &entry.admin_id,
                    &entry.target_type,
                    &entry.target_id,
                    &entry.action,
                    &entry.reason,
                    &entry.metadata,
                    &entry.created_at,
                ],
            )
            .await?;

        tracing::debug!("📝 Audit entry stored: {} {}", entry.action, entry.target_id);
        Ok(())
    }
}

/// Emits entries as structured events on the `audit` tracing target.
#[derive(Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            admin_id = %entry.admin_id,
            target_type = %entry.target_type,
            target_id = %entry.target_id,
            action = %entry.action,
            reason = entry.reason.as_deref().unwrap_or(""),
            metadata = %entry.metadata,
            created_at = %entry.created_at.to_rfc3339(),
            "admin action"
        );
        Ok(())
    }
}
