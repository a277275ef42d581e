//! Submitter notifications — best-effort, fired after a decision is durable.

use std::sync::Arc;

use async_trait::async_trait;

use crate::callback::CallbackAction;
use crate::channels::telegram::TelegramApi;
use crate::error::NotifyError;
use crate::queue::model::{Submission, SubmissionStatus};
use crate::store::UserRecord;

/// Outbound notification sink. Failure never rolls back a decision.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the owner their submission was resolved.
    async fn notify_decision(
        &self,
        owner: &UserRecord,
        submission: &Submission,
    ) -> Result<(), NotifyError>;
}

/// Telegram-backed notifier.
pub struct TelegramNotifier {
    api: Arc<TelegramApi>,
}

impl TelegramNotifier {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_decision(
        &self,
        owner: &UserRecord,
        submission: &Submission,
    ) -> Result<(), NotifyError> {
        let send_err = |e: crate::error::ChannelError| NotifyError::Send {
            chat_id: owner.telegram_id,
            reason: e.to_string(),
        };

        match submission.status {
            SubmissionStatus::Approved => {
                let text = format!(
                    "✅ <b>Ваша заявка #{} одобрена!</b>\n\n{}",
                    submission.id, submission.subject
                );
                self.api
                    .send_message(owner.telegram_id, &text, None)
                    .await
                    .map_err(send_err)
            }
            SubmissionStatus::Rejected => {
                let mut text = format!(
                    "❌ <b>Ваша заявка #{} отклонена.</b>\n\n📌 {}",
                    submission.id, submission.subject
                );
                if let Some(reason) = &submission.admin_reply {
                    text.push_str(&format!("\n💬 Причина: {reason}"));
                }
                self.api
                    .send_message(owner.telegram_id, &text, None)
                    .await
                    .map_err(send_err)
            }
            SubmissionStatus::Answered => {
                // Reply text is delivered on demand via the one-shot read
                // receipt button, not inline.
                let text = format!(
                    "🔔 <b>Получен ответ на ваше обращение #{}</b>",
                    submission.id
                );
                let markup = serde_json::json!({
                    "inline_keyboard": [[{
                        "text": "📖 Прочитать",
                        "callback_data": CallbackAction::AppealReadReply(submission.id).encode(),
                    }]]
                });
                self.api
                    .send_message(owner.telegram_id, &text, Some(markup))
                    .await
                    .map_err(send_err)
            }
            SubmissionStatus::Pending => Ok(()),
        }
    }
}
