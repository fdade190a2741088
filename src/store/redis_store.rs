use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisError};
use tokio::sync::OnceCell;

use super::{KvStore, ScanPage, StoreError};

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.code() == Some("WRONGTYPE") {
            StoreError::WrongType
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Redis-backed [`KvStore`].
///
/// The connection is opened lazily by [`RedisStore::ensure_connected`] and
/// shared by every clone of the `ConnectionManager`, which re-dials on its own
/// when it observes the socket closed.
pub struct RedisStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Parses the URL without connecting.
    pub fn open(redis_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            manager: OnceCell::new(),
        })
    }

    /// Returns a handle to the shared connection, dialing it on first use.
    ///
    /// Concurrent callers wait on the same dial. A failed dial leaves the cell
    /// empty so the next call tries again.
    pub async fn ensure_connected(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                tracing::info!("✅ Redis Connection Manager initialized");
                Ok::<_, StoreError>(manager)
            })
            .await?;

        Ok(manager.clone())
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, StoreError> {
        let mut conn = self.ensure_connected().await?;
        Ok(cmd.query_async(&mut conn).await?)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.query(&cmd).await?;
        Ok(count > 0)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn scan(&self, cursor: &str, pattern: &str, count: usize) -> Result<ScanPage, StoreError> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(count);
        let (cursor, keys): (String, Vec<String>) = self.query(&cmd).await?;
        Ok(ScanPage { cursor, keys })
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.query(&cmd).await
    }

    async fn list_remove(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("LREM");
        cmd.arg(key).arg(count).arg(value);
        self.query(&cmd).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn set_remove(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(value);
        self.query(&cmd).await
    }
}
