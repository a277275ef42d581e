//! Review queue operations — enqueue, next, claim.
//!
//! `next()` is ordering only, not exclusivity: two reviewers pulling at the
//! same time can be handed the same submission. Exclusivity comes from
//! `claim()` and from the guarded update inside the dispatcher.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{Error, ValidationError};
use crate::queue::model::{NewSubmission, Submission, SubmissionKind};
use crate::store::{ClaimOutcome, Store};

/// Result of a `claim()` call, as seen by callers.
#[derive(Debug, Clone)]
pub enum ClaimResult {
    Claimed(Submission),
    AlreadyLocked { by: i64 },
    AlreadyResolved,
    NotFound,
}

/// Durable, typed, ordered holding area for submissions awaiting a decision.
pub struct ReviewQueue {
    store: Arc<dyn Store>,
    lease_window: chrono::Duration,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn Store>, lease_window: std::time::Duration) -> Self {
        Self {
            store,
            lease_window: chrono::Duration::from_std(lease_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    pub(crate) fn lease_window(&self) -> chrono::Duration {
        self.lease_window
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Create a pending submission. Rejects payloads with no content at all.
    pub async fn enqueue(&self, new: NewSubmission) -> Result<Submission, Error> {
        if new.subject.trim().is_empty() && new.body.trim().is_empty() && new.attachments.is_empty()
        {
            return Err(ValidationError::EmptySubmission {
                reason: "no subject, text, or attachments".into(),
            }
            .into());
        }

        let submission = self.store.insert_submission(&new).await?;
        info!(
            submission_id = submission.id,
            kind = submission.kind.code(),
            owner_id = submission.owner_id,
            attachments = submission.attachments.len(),
            "Submission enqueued"
        );
        Ok(submission)
    }

    /// The pending submission of this kind with the smallest `created_at`;
    /// ties broken by ascending id. `None` when the queue is drained.
    pub async fn next(&self, kind: SubmissionKind) -> Result<Option<Submission>, Error> {
        Ok(self.store.next_pending(kind).await?)
    }

    /// Take a time-limited exclusive lease on a pending submission.
    pub async fn claim(&self, id: i64, reviewer_id: i64) -> Result<ClaimResult, Error> {
        let outcome = self
            .store
            .claim_submission(id, reviewer_id, Utc::now(), self.lease_window)
            .await?;

        Ok(match outcome {
            ClaimOutcome::Claimed(sub) => {
                info!(submission_id = id, reviewer_id, "Submission claimed");
                ClaimResult::Claimed(sub)
            }
            ClaimOutcome::AlreadyLocked { by } => ClaimResult::AlreadyLocked { by },
            ClaimOutcome::AlreadyResolved => ClaimResult::AlreadyResolved,
            ClaimOutcome::NotFound => ClaimResult::NotFound,
        })
    }
}
