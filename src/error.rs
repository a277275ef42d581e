//! Error types for union-desk.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Status source error: {0}")]
    Sheets(#[from] SheetsError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Callback error: {0}")]
    Callback(#[from] CallbackError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Malformed submitted data — recovered locally by re-prompting, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Submission has no content: {reason}")]
    EmptySubmission { reason: String },
}

/// External tabular source or credential failures. Degrades only the
/// affected dataset's result, never the whole response.
#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Reviewer decision errors.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Submission {id} is no longer pending")]
    Stale { id: i64 },

    #[error("Decision {decision} is not valid for kind {kind}")]
    InvalidDecision { kind: &'static str, decision: &'static str },
}

/// Outbound notification failed after a decision was already durable.
/// Logged and reported; the decision stands and is not retried.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to notify chat {chat_id}: {reason}")]
    Send { chat_id: i64, reason: String },
}

/// Callback token decoding errors — rejected at the system boundary.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Malformed callback token: {0:?}")]
    Malformed(String),

    #[error("Unknown callback action: {0:?}")]
    UnknownAction(String),

    #[error("Callback token carries a non-numeric id: {0:?}")]
    BadId(String),
}

/// Telegram Bot API transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Bot API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
