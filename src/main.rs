use std::sync::Arc;

use union_desk::channels::{TelegramApi, TelegramNotifier};
use union_desk::config::Config;
use union_desk::intake::{IntakeAggregator, SubmissionIntake};
use union_desk::queue::{DecisionDispatcher, ReviewQueue};
use union_desk::service::Service;
use union_desk::status::{CredentialCache, OAuthCredentialSource, SheetsClient, StatusChecker};
use union_desk::store::{LibSqlStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export UNION_DESK_BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    eprintln!("📋 union-desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Reviewers: {}", config.reviewers.len());

    // ── Database ────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_local(db_path).await.unwrap_or_else(|e| {
        eprintln!("Error: Failed to open database at {}: {e}", config.db_path);
        std::process::exit(1);
    }));

    // ── Review queue and dispatcher ─────────────────────────────────
    let http = reqwest::Client::new();
    let api = Arc::new(TelegramApi::new(config.bot_token.clone(), http.clone()));
    let notifier = Arc::new(TelegramNotifier::new(Arc::clone(&api)));

    let queue = Arc::new(ReviewQueue::new(Arc::clone(&store), config.lease_window));
    let dispatcher = Arc::new(DecisionDispatcher::new(Arc::clone(&queue), notifier));

    // ── Intake ──────────────────────────────────────────────────────
    let sink = Arc::new(SubmissionIntake::new(Arc::clone(&queue)));
    let aggregator = Arc::new(IntakeAggregator::new(sink, config.intake_debounce));

    // ── External status lookups ─────────────────────────────────────
    let credential_source = Arc::new(OAuthCredentialSource::new(
        http.clone(),
        config.sheets_auth.clone(),
    ));
    let credentials = Arc::new(CredentialCache::new(credential_source));
    let fetcher = Arc::new(SheetsClient::new(http, credentials));
    let checker = Arc::new(StatusChecker::new(
        fetcher,
        config.report_ttl,
        config.sheet_ttl,
    ));

    // ── Service loop ────────────────────────────────────────────────
    let service = Service::new(
        api,
        store,
        queue,
        dispatcher,
        aggregator,
        checker,
        &config,
    );
    service.run().await?;
    Ok(())
}
