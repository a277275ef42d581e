//! Default intake sink — assembles one submission per burst and enqueues it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{Error, ValidationError};
use crate::intake::aggregator::{AttachmentEvent, IntakeSink};
use crate::queue::model::NewSubmission;
use crate::queue::review::ReviewQueue;

/// Turns an aggregated batch into exactly one queue entry. Metadata comes
/// from the first event of the burst; attachments keep the sorted order.
pub struct SubmissionIntake {
    queue: Arc<ReviewQueue>,
}

impl SubmissionIntake {
    pub fn new(queue: Arc<ReviewQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl IntakeSink for SubmissionIntake {
    async fn deliver(&self, batch: Vec<AttachmentEvent>) -> Result<(), Error> {
        let first = batch.first().ok_or_else(|| {
            Error::from(ValidationError::EmptySubmission { reason: "empty batch".into() })
        })?;

        // Caption text can arrive on any message of an album; take the first
        // non-empty one.
        let body = batch
            .iter()
            .map(|e| e.body.trim())
            .find(|b| !b.is_empty())
            .unwrap_or_default()
            .to_string();

        let attachments = batch.iter().filter_map(|e| e.attachment.clone()).collect();

        let mut new = NewSubmission::new(first.owner_id, first.kind, first.subject.clone())
            .body(body)
            .attachments(attachments)
            .created_at(first.received_at);
        if let Some(event_id) = first.related_event_id {
            new = new.related_event(event_id);
        }

        let submission = self.queue.enqueue(new).await?;
        info!(
            submission_id = submission.id,
            batch_size = batch.len(),
            "Burst assembled into submission"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::model::{AttachmentRef, SubmissionKind, SubmissionStatus};
    use crate::store::{LibSqlStore, Store};
    use chrono::Utc;
    use std::time::Duration;

    fn photo_event(owner: i64, seq: i64, file_id: &str, body: &str) -> AttachmentEvent {
        AttachmentEvent {
            owner_id: owner,
            kind: SubmissionKind::Appeal,
            subject: "Общие вопросы".into(),
            body: body.into(),
            related_event_id: None,
            group_key: Some("g1".into()),
            seq,
            attachment: Some(AttachmentRef::photo(file_id)),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn batch_becomes_one_ordered_submission() {
        let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let user = store.ensure_user(1, None).await.unwrap();
        let queue = Arc::new(ReviewQueue::new(Arc::clone(&store), Duration::from_secs(300)));
        let sink = SubmissionIntake::new(Arc::clone(&queue));

        // Sorted order, caption only on the second message.
        sink.deliver(vec![
            photo_event(user.id, 1, "ph_a", ""),
            photo_event(user.id, 2, "ph_b", "need help"),
        ])
        .await
        .unwrap();

        let sub = queue.next(SubmissionKind::Appeal).await.unwrap().unwrap();
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert_eq!(sub.body, "need help");
        assert_eq!(
            sub.attachments.iter().map(|a| a.file_id.as_str()).collect::<Vec<_>>(),
            vec!["ph_a", "ph_b"]
        );
    }

    #[tokio::test]
    async fn empty_batch_is_an_error() {
        let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let queue = Arc::new(ReviewQueue::new(store, Duration::from_secs(300)));
        let sink = SubmissionIntake::new(queue);
        assert!(sink.deliver(Vec::new()).await.is_err());
    }
}
