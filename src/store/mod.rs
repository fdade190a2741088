//! The key-value store seam.
//!
//! Everything the registry needs from the store is expressed by [`KvStore`],
//! so the same reader runs against Redis in production and against
//! [`memory::MemoryStore`] in tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors raised by a [`KvStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key holds a different data structure than the operation expects.
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// Any other failure: connection, protocol, server error.
    #[error("{0}")]
    Backend(String),
}

/// One batch returned by [`KvStore::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; `"0"` once the namespace is exhausted.
    pub cursor: String,
    pub keys: Vec<String>,
}

/// The store operations used by the session registry.
///
/// `ttl` follows Redis: `-1` for a key without expiry, `-2` for a missing key.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<u64, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;
    async fn scan(&self, cursor: &str, pattern: &str, count: usize) -> Result<ScanPage, StoreError>;
    /// Inclusive range, negative indices count from the tail.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;
    async fn list_remove(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn set_remove(&self, key: &str, value: &str) -> Result<u64, StoreError>;
}
