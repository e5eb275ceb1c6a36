//! Session lifecycle over an injected [`SessionStore`].
//!
//! ```text
//! load ──► Loaded ──put/renew──► Modified ──commit──► Committed
//!            │                      │                    │
//!            └──────────── destroy ─┴────────────────────┴──► Invalidated
//! ```
//!
//! Every store call is bounded by the manager's timeout. Dropping the future
//! drops the in-flight store call with it.

use std::future::Future;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{AccountId, UserId};

use crate::store::{SessionData, SessionStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loaded,
    Modified,
    Committed,
    Invalidated,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store failed during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("session store timed out during {0}")]
    Timeout(&'static str),

    #[error("session has been destroyed")]
    Invalidated,

    #[error("session lifetime out of range")]
    LifetimeOutOfRange,
}

/// A value staged into the session by [`Session::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValue {
    UserId(UserId),
    ActiveAccount(AccountId),
}

/// Per-request handle on one session.
#[derive(Debug, Clone)]
pub struct Session {
    token: Option<String>,
    data: SessionData,
    expiry: Option<DateTime<Utc>>,
    state: SessionState,
}

impl Session {
    fn fresh() -> Self {
        Self {
            token: None,
            data: SessionData::default(),
            expiry: None,
            state: SessionState::Loaded,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.data.user_id
    }

    pub fn active_account_id(&self) -> Option<AccountId> {
        self.data.active_account_id
    }

    /// Stage a value; nothing is persisted until [`SessionManager::commit`].
    pub fn put(&mut self, value: SessionValue) -> Result<(), SessionError> {
        if self.state == SessionState::Invalidated {
            return Err(SessionError::Invalidated);
        }
        match value {
            SessionValue::UserId(id) => self.data.user_id = Some(id),
            SessionValue::ActiveAccount(id) => self.data.active_account_id = Some(id),
        }
        self.state = SessionState::Modified;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
    timeout: std::time::Duration,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("lifetime", &self.lifetime)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, lifetime: Duration, timeout: std::time::Duration) -> Self {
        Self {
            store,
            lifetime,
            timeout,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(source)) => Err(SessionError::Store { op, source }),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "session store call timed out");
                Err(SessionError::Timeout(op))
            }
        }
    }

    /// Load the session named by `token`, or start an empty one.
    ///
    /// Unknown and expired tokens yield an empty session rather than an error.
    pub async fn load(&self, token: Option<&str>) -> Result<Session, SessionError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(Session::fresh());
        };

        match self.bounded("load", self.store.find(token)).await? {
            Some(stored) if stored.expiry > Utc::now() => Ok(Session {
                token: Some(token.to_string()),
                data: stored.data,
                expiry: Some(stored.expiry),
                state: SessionState::Loaded,
            }),
            _ => {
                debug!("unknown or expired session token; starting fresh");
                Ok(Session::fresh())
            }
        }
    }

    /// Swap the session's token for a new one, keeping its values. The old
    /// token is deleted from the store.
    pub async fn renew_token(&self, session: &mut Session) -> Result<(), SessionError> {
        if session.state == SessionState::Invalidated {
            return Err(SessionError::Invalidated);
        }
        if let Some(old) = session.token.take() {
            self.bounded("renew", self.store.delete(&old)).await?;
        }
        session.token = Some(generate_token());
        session.state = SessionState::Modified;
        Ok(())
    }

    /// Persist the session and return its token and expiry.
    pub async fn commit(&self, session: &mut Session) -> Result<(String, DateTime<Utc>), SessionError> {
        if session.state == SessionState::Invalidated {
            return Err(SessionError::Invalidated);
        }

        let token = match &session.token {
            Some(t) => t.clone(),
            None => {
                let t = generate_token();
                session.token = Some(t.clone());
                t
            }
        };
        let expiry = Utc::now()
            .checked_add_signed(self.lifetime)
            .ok_or(SessionError::LifetimeOutOfRange)?;

        self.bounded("commit", self.store.commit(&token, session.data, expiry))
            .await?;

        session.expiry = Some(expiry);
        session.state = SessionState::Committed;
        Ok((token, expiry))
    }

    /// Remove the session from the store. Calling it again is a no-op.
    pub async fn destroy(&self, session: &mut Session) -> Result<(), SessionError> {
        let token = session.token.take();
        session.data = SessionData::default();
        session.expiry = None;
        session.state = SessionState::Invalidated;

        if let Some(token) = token {
            self.bounded("destroy", self.store.delete(&token)).await?;
        }
        Ok(())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemorySessionStore, StoredSession};
    use async_trait::async_trait;

    fn manager() -> (Arc<InMemorySessionStore>, SessionManager) {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = SessionManager::new(store.clone(), Duration::hours(1), std::time::Duration::from_secs(1));
        (store, manager)
    }

    async fn logged_in(manager: &SessionManager, user: UserId, account: AccountId) -> String {
        let mut s = manager.load(None).await.unwrap();
        manager.renew_token(&mut s).await.unwrap();
        s.put(SessionValue::UserId(user)).unwrap();
        s.put(SessionValue::ActiveAccount(account)).unwrap();
        manager.commit(&mut s).await.unwrap().0
    }

    #[tokio::test]
    async fn commit_then_load_sees_the_values() {
        let (_, manager) = manager();
        let (user, account) = (UserId::new(), AccountId::new());

        let token = logged_in(&manager, user, account).await;
        let s = manager.load(Some(&token)).await.unwrap();

        assert_eq!(s.state(), SessionState::Loaded);
        assert_eq!(s.user_id(), Some(user));
        assert_eq!(s.active_account_id(), Some(account));
    }

    #[tokio::test]
    async fn state_machine_advances() {
        let (_, manager) = manager();
        let mut s = manager.load(None).await.unwrap();
        assert_eq!(s.state(), SessionState::Loaded);

        s.put(SessionValue::UserId(UserId::new())).unwrap();
        assert_eq!(s.state(), SessionState::Modified);

        manager.commit(&mut s).await.unwrap();
        assert_eq!(s.state(), SessionState::Committed);

        manager.destroy(&mut s).await.unwrap();
        assert_eq!(s.state(), SessionState::Invalidated);
        assert!(matches!(s.put(SessionValue::UserId(UserId::new())), Err(SessionError::Invalidated)));
        assert!(matches!(manager.commit(&mut s).await, Err(SessionError::Invalidated)));
    }

    #[tokio::test]
    async fn renewal_invalidates_the_old_token_and_keeps_values() {
        let (_, manager) = manager();
        let (user, account) = (UserId::new(), AccountId::new());
        let old = logged_in(&manager, user, account).await;

        let mut s = manager.load(Some(&old)).await.unwrap();
        manager.renew_token(&mut s).await.unwrap();
        let (new, _) = manager.commit(&mut s).await.unwrap();

        assert_ne!(old, new);
        assert_eq!(manager.load(Some(&old)).await.unwrap().user_id(), None);
        assert_eq!(manager.load(Some(&new)).await.unwrap().user_id(), Some(user));
    }

    #[tokio::test]
    async fn unknown_token_loads_an_empty_session() {
        let (_, manager) = manager();
        let s = manager.load(Some("nope")).await.unwrap();
        assert_eq!(s.user_id(), None);
        assert_eq!(s.token(), None);
    }

    #[tokio::test]
    async fn destroy_twice_does_not_resurrect() {
        let (store, manager) = manager();
        let token = logged_in(&manager, UserId::new(), AccountId::new()).await;

        let mut s = manager.load(Some(&token)).await.unwrap();
        manager.destroy(&mut s).await.unwrap();
        manager.destroy(&mut s).await.unwrap();

        assert!(store.is_empty());
        assert_eq!(manager.load(Some(&token)).await.unwrap().user_id(), None);
    }

    #[tokio::test]
    async fn store_failures_surface_as_errors() {
        let (store, manager) = manager();
        let token = logged_in(&manager, UserId::new(), AccountId::new()).await;
        store.set_failing(true);

        assert!(matches!(
            manager.load(Some(&token)).await,
            Err(SessionError::Store { op: "load", .. })
        ));

        let mut s = Session::fresh();
        assert!(matches!(manager.commit(&mut s).await, Err(SessionError::Store { op: "commit", .. })));
    }

    #[tokio::test]
    async fn oversized_lifetime_is_an_error_not_a_panic() {
        let manager = SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            Duration::MAX,
            std::time::Duration::from_secs(1),
        );

        let mut s = Session::fresh();
        assert!(matches!(manager.commit(&mut s).await, Err(SessionError::LifetimeOutOfRange)));
    }

    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
        async fn find(&self, _: &str) -> Result<Option<StoredSession>, StoreError> {
            std::future::pending().await
        }

        async fn commit(&self, _: &str, _: SessionData, _: DateTime<Utc>) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out() {
        let manager = SessionManager::new(
            Arc::new(StalledStore),
            Duration::hours(1),
            std::time::Duration::from_millis(50),
        );

        assert!(matches!(manager.load(Some("t")).await, Err(SessionError::Timeout("load"))));

        let mut s = Session::fresh();
        assert!(matches!(manager.commit(&mut s).await, Err(SessionError::Timeout("commit"))));
    }
}
