//! Server-side sessions and the signed cookie that carries their token.

pub mod cookie;
pub mod manager;
pub mod store;

pub use cookie::{CookieCodec, CookieError, CookieOptions, find_cookie};
pub use manager::{Session, SessionError, SessionManager, SessionState, SessionValue};
pub use store::{InMemorySessionStore, SessionData, SessionStore, StoreError, StoredSession};
