//! External status lookups — TTL cache over a slow, rate-limited tabular
//! source, plus the credential needed to reach it.

pub mod cache;
pub mod checker;
pub mod credential;
pub mod sheets;

pub use cache::TtlCache;
pub use checker::{Classification, DatasetStatus, StatusChecker, StatusReport, StudentRef};
pub use credential::{Credential, CredentialCache, CredentialSource, OAuthCredentialSource};
pub use sheets::{DatasetSource, SheetsClient, ValuesFetcher};
