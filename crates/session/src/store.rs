use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use warden_core::{AccountId, UserId};

/// Values a session carries between requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Option<UserId>,
    pub active_account_id: Option<AccountId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredSession {
    pub data: SessionData,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("session store: {0}")]
pub struct StoreError(pub String);

/// Backing storage for sessions, keyed by opaque token.
///
/// Concurrent commits for the same token resolve as last-writer-wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<StoredSession>, StoreError>;

    async fn commit(&self, token: &str, data: SessionData, expiry: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

/// In-memory session store.
///
/// Intended for tests/dev. Expired entries are hidden from `find` and pruned on
/// the next commit.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    failing: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find(&self, token: &str) -> Result<Option<StoredSession>, StoreError> {
        self.check()?;
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .get(token)
            .filter(|s| s.expiry > now)
            .copied())
    }

    async fn commit(&self, token: &str, data: SessionData, expiry: DateTime<Utc>) -> Result<(), StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| s.expiry > now);
        sessions.insert(token.to_string(), StoredSession { data, expiry });
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.check()?;
        self.sessions.write().remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn expired_sessions_are_invisible() {
        let store = InMemorySessionStore::new();
        let data = SessionData {
            user_id: Some(UserId::new()),
            active_account_id: None,
        };

        store.commit("old", data, Utc::now() - Duration::seconds(1)).await.unwrap();
        store.commit("new", data, Utc::now() + Duration::hours(1)).await.unwrap();

        assert!(store.find("old").await.unwrap().is_none());
        assert_eq!(store.find("new").await.unwrap().unwrap().data, data);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failing_store_surfaces_errors() {
        let store = InMemorySessionStore::new();
        store.set_failing(true);
        assert!(store.find("x").await.is_err());
        assert!(store.delete("x").await.is_err());
    }
}
