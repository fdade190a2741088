use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::services::audit::{AuditSink, LogAuditSink, PgAuditSink};
use crate::services::sessions::SessionRegistry;
use crate::store::{KvStore, MemoryStore, RedisStore};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session registry.
    pub registry: SessionRegistry,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`, building the store and audit backends
    /// selected by `config`.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn KvStore> = match config.store_backend {
            StoreBackend::Redis => {
                let redis = RedisStore::open(&config.redis_url)?;
                match redis.ensure_connected().await {
                    Ok(_) => tracing::info!("✅ Redis reachable at startup"),
                    Err(e) => tracing::warn!("⚠️ Redis not reachable yet, will retry on demand: {}", e),
                }
                Arc::new(redis)
            }
            StoreBackend::Memory => {
                tracing::warn!("⚠️ Using in-memory session store; data is not shared or persisted");
                Arc::new(MemoryStore::new())
            }
        };

        let audit: Arc<dyn AuditSink> = match config.database_url.as_deref() {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                tracing::info!("✅ Audit log writing to PostgreSQL admin_actions");
                Arc::new(PgAuditSink::new(pool))
            }
            None => {
                tracing::info!("✅ Audit log writing to tracing target 'audit'");
                Arc::new(LogAuditSink)
            }
        };

        Ok(Self::from_parts(config.clone(), store, audit))
    }

    /// Assembles a state from already-built backends.
    pub fn from_parts(config: Config, store: Arc<dyn KvStore>, audit: Arc<dyn AuditSink>) -> Self {
        AppState {
            registry: SessionRegistry::new(store, audit),
            config,
        }
    }
}
