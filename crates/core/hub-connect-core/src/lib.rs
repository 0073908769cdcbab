//! Core connection types and storage traits.
//!
//! A [`Connection`] is the persisted record of one user's link to one
//! third-party [`Platform`]. This crate defines the record, its token status,
//! and the [`ConnectionStore`] contract the OAuth2 orchestration layer writes
//! through. Storage engines live outside this crate; an in-memory store is
//! provided for tests and single-process deployments.

mod connection;
mod platform;
mod store;

pub use connection::{Connection, TokenStatus};
pub use platform::{Platform, UnknownPlatform};
pub use store::{ConnectionStore, InMemoryConnectionStore, StoreError, StoreResult};
