//! `warden-core`: identifiers and error primitives shared by every crate.
//!
//! This crate has no knowledge of sessions, tokens or HTTP.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, UserId};
