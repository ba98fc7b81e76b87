use redis::{aio::MultiplexedConnection, RedisResult};
use tokio::sync::RwLock;

/// A lazily established, shared Redis connection.
///
/// Opening the client never touches the network; the multiplexed connection
/// is created on first use and dropped again after any command error so the
/// next caller reconnects. This keeps a Redis outage from being permanent.
pub struct RedisConnector {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisConnector {
    pub fn open(url: &str) -> RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: RwLock::new(None),
        })
    }

    pub async fn connection(&self) -> RedisResult<MultiplexedConnection> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        // Another task may have connected while we waited for the lock.
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        tracing::debug!("Redis connection established");
        Ok(conn)
    }

    /// Forget the current connection after an error.
    pub async fn reset(&self) {
        self.connection.write().await.take();
        tracing::debug!("Redis connection reset");
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnector").finish_non_exhaustive()
    }
}
