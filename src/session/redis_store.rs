use super::{SessionState, SessionStore, SessionStoreError};
use crate::config::SESSION_STORE_PING_TIMEOUT_SECS;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo};
use std::time::Duration;
use tracing::{error, info};

/// Redis-backed session store; one JSON string per chat with `SET EX`.
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl RedisSessionStore {
    /// Connects to the store and verifies the connection with a bounded `PING`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Unavailable` if the parameters are invalid,
    /// the connection fails, or the ping does not answer within 5 seconds.
    pub async fn connect(
        info: impl IntoConnectionInfo,
        ttl: Duration,
    ) -> Result<Self, SessionStoreError> {
        let client = redis::Client::open(info).map_err(unavailable)?;

        let deadline = Duration::from_secs(SESSION_STORE_PING_TIMEOUT_SECS);
        let conn = tokio::time::timeout(deadline, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        })
        .await
        .map_err(|_| SessionStoreError::Unavailable("ping timed out".to_string()))?
        .map_err(unavailable)?;

        info!(ttl_secs = ttl.as_secs(), "Session store connected.");
        Ok(Self { conn, ttl })
    }

    fn key(chat_id: i64) -> String {
        chat_id.to_string()
    }
}

fn unavailable(e: redis::RedisError) -> SessionStoreError {
    SessionStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, chat_id: i64, state: &SessionState) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_string(state)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(chat_id), payload, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                error!(chat_id, error = %e, "Failed to save session");
                unavailable(e)
            })
    }

    async fn get(&self, chat_id: i64) -> Result<Option<SessionState>, SessionStoreError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::key(chat_id)).await.map_err(|e| {
            error!(chat_id, error = %e, "Failed to load session");
            unavailable(e)
        })?;

        payload
            .map(|raw| serde_json::from_str(&raw).map_err(SessionStoreError::from))
            .transpose()
    }

    async fn delete(&self, chat_id: i64) -> Result<(), SessionStoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(chat_id))
            .await
            .map_err(unavailable)
    }
}
