//! Redis-backed visited set
//!
//! The set lives under a single key. `SADD` gives atomic test-and-insert
//! (its reply is the number of new members) and `DEL` clears it.

use crate::storage::{StorageError, StorageResult, VisitedSet};
use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::time::Duration;

/// How long connecting and the initial PING may take
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`VisitedSet`] stored as a Redis set
#[derive(Clone)]
pub struct RedisVisitedSet {
    conn: MultiplexedConnection,
    set_key: String,
}

impl RedisVisitedSet {
    /// Connects to Redis and verifies the connection with PING
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Connection URL, e.g. `redis://127.0.0.1:6379/0`
    /// * `set_key` - Key of the set holding visited URLs
    pub async fn connect(redis_url: &str, set_key: &str) -> StorageResult<Self> {
        let client = ::redis::Client::open(redis_url)?;

        let connect = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StorageError>(conn)
        };

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| StorageError::ConnectTimeout(redis_url.to_string()))??;

        tracing::debug!("Connected to Redis visited set '{}'", set_key);

        Ok(Self {
            conn,
            set_key: set_key.to_string(),
        })
    }
}

#[async_trait]
impl VisitedSet for RedisVisitedSet {
    async fn try_insert(&self, url: &str) -> StorageResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(&self.set_key, url).await?;
        Ok(added > 0)
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&self.set_key).await?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        // The multiplexed connection shuts down when its last handle drops
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisVisitedSet::connect("not a redis url", "crawler:visited_urls").await;
        assert!(matches!(result, Err(StorageError::Redis(_))));
    }

    #[tokio::test]
    async fn test_connect_fails_when_nothing_listens() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let url = format!("redis://127.0.0.1:{}/0", port);
        assert!(RedisVisitedSet::connect(&url, "crawler:visited_urls")
            .await
            .is_err());
    }
}
