//! Backend-agnostic store trait.
//!
//! All statements behind this trait are parameterized — no query is ever
//! assembled from untrusted text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::queue::model::{NewSubmission, Submission, SubmissionKind, SubmissionStatus};

/// A registered user (submitter or reviewer).
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
    pub group_name: Option<String>,
    pub student_number: Option<String>,
}

/// An event students can register for.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a lease grab on a pending submission.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Lease granted (or renewed by the same reviewer).
    Claimed(Submission),
    /// Another reviewer holds an unexpired lease.
    AlreadyLocked { by: i64 },
    /// The submission already left `pending`.
    AlreadyResolved,
    /// No such submission.
    NotFound,
}

/// Result of a guarded terminal-status update.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(Submission),
    /// Not pending any more, or leased by a different reviewer.
    Stale,
    NotFound,
}

/// Database trait covering users, events, and the submission queue.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Users ───────────────────────────────────────────────────────

    /// Insert the user if unknown, refresh the username otherwise.
    async fn ensure_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<UserRecord, DatabaseError>;

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError>;

    async fn get_user_by_telegram(
        &self,
        telegram_id: i64,
    ) -> Result<Option<UserRecord>, DatabaseError>;

    /// Update profile fields used for status lookups and review captions.
    async fn update_profile(
        &self,
        telegram_id: i64,
        last_name: &str,
        first_name: &str,
        patronymic: Option<&str>,
        group_name: &str,
        student_number: &str,
    ) -> Result<(), DatabaseError>;

    // ── Submissions ─────────────────────────────────────────────────

    /// Insert a new pending submission and return it with its surrogate id.
    async fn insert_submission(&self, new: &NewSubmission) -> Result<Submission, DatabaseError>;

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, DatabaseError>;

    /// Oldest pending submission of the kind; ties broken by ascending id.
    async fn next_pending(
        &self,
        kind: SubmissionKind,
    ) -> Result<Option<Submission>, DatabaseError>;

    /// Atomically set the lease fields if the submission is pending and
    /// unlocked, lease-expired, or already held by this reviewer.
    async fn claim_submission(
        &self,
        id: i64,
        reviewer_id: i64,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<ClaimOutcome, DatabaseError>;

    /// One atomic update: terminal status + admin reply, guarded on the row
    /// still being pending and not leased by someone else.
    async fn resolve_submission(
        &self,
        id: i64,
        reviewer_id: i64,
        status: SubmissionStatus,
        reply: Option<&str>,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<ResolveOutcome, DatabaseError>;

    /// One-shot read receipt for an appeal reply. Returns `false` if the
    /// receipt was already recorded.
    async fn mark_reply_read(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Find a user's registration for an event, regardless of status.
    async fn find_event_registration(
        &self,
        owner_id: i64,
        event_id: i64,
    ) -> Result<Option<Submission>, DatabaseError>;

    /// Explicit cancel — physically deletes the registration. Distinct from
    /// rejection; the only path that ever deletes a submission.
    async fn cancel_event_registration(
        &self,
        owner_id: i64,
        event_id: i64,
    ) -> Result<bool, DatabaseError>;

    /// Whether the owner has any fee payment in the given status.
    async fn has_fee_payment(
        &self,
        owner_id: i64,
        status: SubmissionStatus,
    ) -> Result<bool, DatabaseError>;

    // ── Events ──────────────────────────────────────────────────────

    async fn insert_event(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<i64, DatabaseError>;

    async fn get_event(&self, id: i64) -> Result<Option<EventRecord>, DatabaseError>;

    async fn list_events(&self) -> Result<Vec<EventRecord>, DatabaseError>;
}
