//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the local database file.
    pub db_path: String,
    /// Telegram bot token.
    pub bot_token: SecretString,
    /// Reviewer (union staff) telegram ids.
    pub reviewers: Vec<i64>,
    /// Debounce window for grouping multi-attachment bursts.
    pub intake_debounce: Duration,
    /// Inactivity window after which a review lease expires.
    pub lease_window: Duration,
    /// TTL for assembled per-student status reports.
    pub report_ttl: Duration,
    /// TTL for raw sheet values.
    pub sheet_ttl: Duration,
    /// Credential exchange for the read-only tabular source.
    pub sheets_auth: SheetsAuthConfig,
}

/// OAuth refresh-token exchange parameters for the sheets source.
#[derive(Debug, Clone)]
pub struct SheetsAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./data/union-desk.db".to_string(),
            bot_token: SecretString::from(String::new()),
            reviewers: Vec::new(),
            intake_debounce: Duration::from_millis(500),
            lease_window: Duration::from_secs(300), // 5 minutes
            report_ttl: Duration::from_secs(3600),
            sheet_ttl: Duration::from_secs(1800),
            sheets_auth: SheetsAuthConfig {
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                client_id: String::new(),
                client_secret: SecretString::from(String::new()),
                refresh_token: SecretString::from(String::new()),
            },
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to defaults
    /// for everything except the bot token.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        config.bot_token = SecretString::from(
            std::env::var("UNION_DESK_BOT_TOKEN")
                .map_err(|_| ConfigError::MissingEnvVar("UNION_DESK_BOT_TOKEN".into()))?,
        );

        if let Ok(path) = std::env::var("UNION_DESK_DB_PATH") {
            config.db_path = path;
        }

        if let Ok(raw) = std::env::var("UNION_DESK_REVIEWERS") {
            config.reviewers = parse_id_list("UNION_DESK_REVIEWERS", &raw)?;
        }

        if let Ok(raw) = std::env::var("UNION_DESK_DEBOUNCE_MS") {
            config.intake_debounce = Duration::from_millis(parse_u64("UNION_DESK_DEBOUNCE_MS", &raw)?);
        }

        if let Ok(raw) = std::env::var("UNION_DESK_LEASE_SECS") {
            config.lease_window = Duration::from_secs(parse_u64("UNION_DESK_LEASE_SECS", &raw)?);
        }

        if let Ok(url) = std::env::var("UNION_DESK_SHEETS_TOKEN_URL") {
            config.sheets_auth.token_url = url;
        }
        if let Ok(id) = std::env::var("UNION_DESK_SHEETS_CLIENT_ID") {
            config.sheets_auth.client_id = id;
        }
        if let Ok(secret) = std::env::var("UNION_DESK_SHEETS_CLIENT_SECRET") {
            config.sheets_auth.client_secret = SecretString::from(secret);
        }
        if let Ok(token) = std::env::var("UNION_DESK_SHEETS_REFRESH_TOKEN") {
            config.sheets_auth.refresh_token = SecretString::from(token);
        }

        Ok(config)
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected an integer, got {raw:?}"),
    })
}

fn parse_id_list(key: &str, raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split([',', ' '])
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a telegram id, got {s:?}"),
            })
        })
        .collect()
}
