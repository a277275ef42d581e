//! Decision dispatcher — applies a reviewer's verdict and closes the loop.
//!
//! The status update is one guarded, parameterized UPDATE; the follow-up
//! queue pull happens before the notification attempt so notify latency
//! cannot stall the re-serve, and a notification failure never rolls the
//! decision back.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::channels::Notifier;
use crate::error::{DatabaseError, DecisionError, Error, NotifyError};
use crate::queue::model::{Decision, Submission, decision_status};
use crate::queue::review::ReviewQueue;
use crate::store::ResolveOutcome;

/// What a reviewer's client gets back from one decision: the resolved
/// submission, the next item of the same kind (no separate refresh step),
/// and the notification failure if one occurred.
#[derive(Debug)]
pub struct DecisionOutcome {
    pub decided: Submission,
    pub next: Option<Submission>,
    pub notify_error: Option<NotifyError>,
}

pub struct DecisionDispatcher {
    queue: Arc<ReviewQueue>,
    notifier: Arc<dyn Notifier>,
}

impl DecisionDispatcher {
    pub fn new(queue: Arc<ReviewQueue>, notifier: Arc<dyn Notifier>) -> Self {
        Self { queue, notifier }
    }

    /// Apply a decision to a pending submission.
    ///
    /// Fails with `DecisionError::Stale` when the submission is already
    /// resolved or leased to a different reviewer.
    pub async fn apply_decision(
        &self,
        id: i64,
        decision: Decision,
        note: Option<&str>,
        reviewer_id: i64,
    ) -> Result<DecisionOutcome, Error> {
        let store = self.queue.store();

        let current = store
            .get_submission(id)
            .await?
            .ok_or(DatabaseError::NotFound { entity: "submission", id })?;

        let target = decision_status(current.kind, decision).ok_or(
            DecisionError::InvalidDecision {
                kind: current.kind.code(),
                decision: decision.code(),
            },
        )?;

        let outcome = store
            .resolve_submission(
                id,
                reviewer_id,
                target,
                note,
                Utc::now(),
                self.queue.lease_window(),
            )
            .await?;

        let decided = match outcome {
            ResolveOutcome::Resolved(sub) => sub,
            ResolveOutcome::Stale => return Err(DecisionError::Stale { id }.into()),
            ResolveOutcome::NotFound => {
                return Err(DatabaseError::NotFound { entity: "submission", id }.into());
            }
        };

        info!(
            submission_id = decided.id,
            kind = decided.kind.code(),
            status = decided.status.code(),
            reviewer_id,
            "Decision applied"
        );

        // Serve the follow-up item before touching the (slow) notification
        // path.
        let next = self.queue.next(decided.kind).await?;

        let notify_error = match self.notify_owner(&decided).await {
            Ok(()) => None,
            Err(e) => {
                warn!(submission_id = decided.id, error = %e, "Owner notification failed");
                Some(e)
            }
        };

        Ok(DecisionOutcome { decided, next, notify_error })
    }

    /// One-shot read receipt for an appeal reply. Returns the reply text on
    /// the first read, `None` when already read (or no reply exists).
    pub async fn read_reply(&self, id: i64) -> Result<Option<String>, Error> {
        let store = self.queue.store();
        if !store.mark_reply_read(id, Utc::now()).await? {
            return Ok(None);
        }
        let sub = store
            .get_submission(id)
            .await?
            .ok_or(DatabaseError::NotFound { entity: "submission", id })?;
        Ok(sub.admin_reply)
    }

    async fn notify_owner(&self, submission: &Submission) -> Result<(), NotifyError> {
        let store = self.queue.store();
        let owner = match store.get_user(submission.owner_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(NotifyError::Send {
                    chat_id: 0,
                    reason: format!("owner {} not found", submission.owner_id),
                });
            }
            Err(e) => {
                return Err(NotifyError::Send { chat_id: 0, reason: e.to_string() });
            }
        };
        self.notifier.notify_decision(&owner, submission).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::model::{NewSubmission, SubmissionKind, SubmissionStatus};
    use crate::store::{LibSqlStore, Store, UserRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records notification attempts; optionally fails every send.
    struct RecordingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self { sent: AtomicUsize::new(0), fail }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_decision(
            &self,
            owner: &UserRecord,
            _submission: &Submission,
        ) -> Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NotifyError::Send {
                    chat_id: owner.telegram_id,
                    reason: "wire down".into(),
                });
            }
            Ok(())
        }
    }

    async fn setup(fail_notify: bool) -> (DecisionDispatcher, Arc<ReviewQueue>, Arc<RecordingNotifier>, i64) {
        let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let user = store.ensure_user(1, None).await.unwrap();
        let queue = Arc::new(ReviewQueue::new(store, Duration::from_secs(300)));
        let notifier = Arc::new(RecordingNotifier::new(fail_notify));
        let dispatcher = DecisionDispatcher::new(Arc::clone(&queue), notifier.clone());
        (dispatcher, queue, notifier, user.id)
    }

    #[tokio::test]
    async fn approve_round_trip_and_stale_second_decision() {
        let (dispatcher, queue, notifier, owner) = setup(false).await;

        let sub = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Document, "справка"))
            .await
            .unwrap();

        let outcome = dispatcher
            .apply_decision(sub.id, Decision::Approve, None, 10)
            .await
            .unwrap();
        assert_eq!(outcome.decided.status, SubmissionStatus::Approved);
        assert!(outcome.next.is_none());
        assert!(outcome.notify_error.is_none());
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        // Direct read shows the durable resolution.
        let stored = queue.store().get_submission(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Approved);

        let err = dispatcher
            .apply_decision(sub.id, Decision::Approve, None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decision(DecisionError::Stale { .. })));
        // The failed second decision did not notify again.
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decision_serves_next_item_of_same_kind() {
        let (dispatcher, queue, _notifier, owner) = setup(false).await;

        let first = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Appeal, "тема 1").body("a"))
            .await
            .unwrap();
        let second = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Appeal, "тема 2").body("b"))
            .await
            .unwrap();

        let outcome = dispatcher
            .apply_decision(first.id, Decision::Answer, Some("см. часы приёма"), 10)
            .await
            .unwrap();
        assert_eq!(outcome.decided.admin_reply.as_deref(), Some("см. часы приёма"));
        assert_eq!(outcome.next.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn notify_failure_does_not_roll_back() {
        let (dispatcher, queue, notifier, owner) = setup(true).await;

        let sub = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::FeePayment, "взнос"))
            .await
            .unwrap();

        let outcome = dispatcher
            .apply_decision(sub.id, Decision::Reject, Some("нет чека"), 10)
            .await
            .unwrap();
        assert!(outcome.notify_error.is_some());
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        let stored = queue.store().get_submission(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Rejected);
    }

    #[tokio::test]
    async fn wrong_decision_for_kind_is_refused() {
        let (dispatcher, queue, _notifier, owner) = setup(false).await;

        let appeal = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Appeal, "вопрос").body("text"))
            .await
            .unwrap();

        let err = dispatcher
            .apply_decision(appeal.id, Decision::Approve, None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decision(DecisionError::InvalidDecision { .. })));

        // Still pending after the refused decision.
        let stored = queue.store().get_submission(appeal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    async fn reply_read_receipt_yields_text_once() {
        let (dispatcher, queue, _notifier, owner) = setup(false).await;

        let appeal = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Appeal, "вопрос").body("text"))
            .await
            .unwrap();
        dispatcher
            .apply_decision(appeal.id, Decision::Answer, Some("ответ"), 10)
            .await
            .unwrap();

        assert_eq!(dispatcher.read_reply(appeal.id).await.unwrap().as_deref(), Some("ответ"));
        assert_eq!(dispatcher.read_reply(appeal.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn foreign_lease_blocks_decision() {
        let (dispatcher, queue, _notifier, owner) = setup(false).await;

        let sub = queue
            .enqueue(NewSubmission::new(owner, SubmissionKind::Document, "справка"))
            .await
            .unwrap();
        queue.claim(sub.id, 10).await.unwrap();

        let err = dispatcher
            .apply_decision(sub.id, Decision::Approve, None, 11)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decision(DecisionError::Stale { .. })));

        // The lease holder can decide.
        let ok = dispatcher.apply_decision(sub.id, Decision::Approve, None, 10).await;
        assert!(ok.is_ok());
    }
}
