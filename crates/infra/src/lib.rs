//! In-memory and local implementations of the collaborators `warden-auth`
//! consumes: user and membership directory, API-client registry, credential
//! checks and audit sinks.

pub mod api_clients;
pub mod audit;
pub mod authenticator;
pub mod directory;

pub use api_clients::InMemoryApiClients;
pub use audit::{RecordingAuditLog, TracingAuditLog};
pub use authenticator::{BcryptTotpAuthenticator, totp_code, verify_totp};
pub use directory::InMemoryDirectory;
