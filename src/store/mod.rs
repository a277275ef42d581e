//! Persistence layer — libSQL-backed storage for users, events, and submissions.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{ClaimOutcome, EventRecord, ResolveOutcome, Store, UserRecord};
