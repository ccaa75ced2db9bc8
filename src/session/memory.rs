use super::{SessionState, SessionStore, SessionStoreError};
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

/// In-process session store with the same TTL semantics as Redis.
///
/// Used when no store address is configured and by tests. Sessions do not
/// survive a restart.
#[derive(Clone)]
pub struct MemorySessionStore {
    cache: Cache<i64, SessionState>,
}

impl MemorySessionStore {
    /// Creates a store whose entries expire `ttl` after their last write.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, chat_id: i64, state: &SessionState) -> Result<(), SessionStoreError> {
        self.cache.insert(chat_id, state.clone()).await;
        Ok(())
    }

    async fn get(&self, chat_id: i64) -> Result<Option<SessionState>, SessionStoreError> {
        Ok(self.cache.get(&chat_id).await)
    }

    async fn delete(&self, chat_id: i64) -> Result<(), SessionStoreError> {
        self.cache.invalidate(&chat_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SearchKind;

    #[tokio::test]
    async fn test_put_then_get_returns_equal_state() -> Result<(), SessionStoreError> {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let state = SessionState::searching(SearchKind::PagingPeople, "nolan").at_page(2);

        store.put(1, &state).await?;
        assert_eq!(store.get(1).await?, Some(state));
        assert_eq!(store.get(2).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_put_overwrites() -> Result<(), SessionStoreError> {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        store.put(1, &SessionState::awaiting(SearchKind::AwaitingFilmQuery)).await?;
        store.put(1, &SessionState::person_films(9)).await?;

        let stored = store.get(1).await?.expect("session present");
        assert_eq!(stored.kind, SearchKind::PagingPersonFilms);
        assert_eq!(stored.person_id, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes() -> Result<(), SessionStoreError> {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        store.put(1, &SessionState::awaiting(SearchKind::AwaitingFilmQuery)).await?;
        store.delete(1).await?;
        assert_eq!(store.get(1).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_reads_as_absent() -> Result<(), SessionStoreError> {
        let store = MemorySessionStore::new(Duration::from_millis(50));
        store.put(1, &SessionState::awaiting(SearchKind::AwaitingFilmQuery)).await?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get(1).await?, None);
        Ok(())
    }
}
