//! Per-chat search sessions
//!
//! A session remembers what a chat is currently searching so pagination and
//! drill-down callbacks can be served across independent updates. Sessions are
//! stored as JSON with an absolute TTL per write.

mod memory;
mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during session store operations
#[derive(Error, Debug)]
pub enum SessionStoreError {
    /// The store could not be reached or rejected the command
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be encoded or decoded
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a chat is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Film category picked, waiting for the query text
    AwaitingFilmQuery,
    /// Person category picked, waiting for the query text
    AwaitingPersonQuery,
    /// Browsing film search results
    PagingFilms,
    /// Browsing person search results
    PagingPeople,
    /// Browsing the filmography of one person
    PagingPersonFilms,
}

impl SearchKind {
    /// Paging kind a free-text query moves this session into.
    #[must_use]
    pub const fn query_target(self) -> Self {
        match self {
            Self::AwaitingFilmQuery | Self::PagingFilms => Self::PagingFilms,
            Self::AwaitingPersonQuery | Self::PagingPeople | Self::PagingPersonFilms => {
                Self::PagingPeople
            }
        }
    }
}

/// Snapshot of one chat's search session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "type")]
    pub kind: SearchKind,
    /// Last free-text query; empty while awaiting input and for filmographies
    #[serde(default)]
    pub query: String,
    /// Only meaningful for [`SearchKind::PagingPersonFilms`]
    #[serde(default)]
    pub person_id: i64,
    /// 1-based page cursor
    pub page: u32,
}

impl SessionState {
    /// Fresh session after a menu selection.
    #[must_use]
    pub const fn awaiting(kind: SearchKind) -> Self {
        Self {
            kind,
            query: String::new(),
            person_id: 0,
            page: 1,
        }
    }

    /// Session positioned on page 1 of a free-text search.
    #[must_use]
    pub fn searching(kind: SearchKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            query: query.into(),
            person_id: 0,
            page: 1,
        }
    }

    /// Session positioned on page 1 of a person's filmography.
    #[must_use]
    pub const fn person_films(person_id: i64) -> Self {
        Self {
            kind: SearchKind::PagingPersonFilms,
            query: String::new(),
            person_id,
            page: 1,
        }
    }

    /// Same session moved to `page`.
    #[must_use]
    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// Key-value store mapping a chat to its session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrites the chat's session and resets its TTL
    async fn put(&self, chat_id: i64, state: &SessionState) -> Result<(), SessionStoreError>;
    /// Reads the chat's session; `None` when absent or expired
    async fn get(&self, chat_id: i64) -> Result<Option<SessionState>, SessionStoreError>;
    /// Removes the chat's session
    async fn delete(&self, chat_id: i64) -> Result<(), SessionStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let state = SessionState::searching(SearchKind::PagingFilms, "matrix");
        let value = serde_json::to_value(&state).expect("serializable");
        assert_eq!(
            value,
            serde_json::json!({"type": "paging_films", "query": "matrix", "person_id": 0, "page": 1})
        );
    }

    #[test]
    fn test_json_round_trip() {
        let state = SessionState::person_films(123).at_page(4);
        let raw = serde_json::to_string(&state).expect("serializable");
        let back: SessionState = serde_json::from_str(&raw).expect("deserializable");
        assert_eq!(back, state);
    }

    #[test]
    fn test_query_target() {
        assert_eq!(SearchKind::AwaitingFilmQuery.query_target(), SearchKind::PagingFilms);
        assert_eq!(SearchKind::PagingFilms.query_target(), SearchKind::PagingFilms);
        assert_eq!(SearchKind::AwaitingPersonQuery.query_target(), SearchKind::PagingPeople);
        assert_eq!(SearchKind::PagingPersonFilms.query_target(), SearchKind::PagingPeople);
    }

    #[test]
    fn test_at_page_keeps_context() {
        let state = SessionState::searching(SearchKind::PagingPeople, "nolan").at_page(3);
        assert_eq!(state.kind, SearchKind::PagingPeople);
        assert_eq!(state.query, "nolan");
        assert_eq!(state.page, 3);
    }
}
