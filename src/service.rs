//! Long-poll service loop — routes inbound messages and button presses to
//! the intake, review, and status subsystems.
//!
//! Every update is handled behind a top-level guard: a handler error is
//! logged and turned into an apology message, never a crash and never a
//! half-applied decision (the guarded updates in the store make partial
//! application impossible).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::callback::CallbackAction;
use crate::channels::TelegramApi;
use crate::config::Config;
use crate::error::{CallbackError, DecisionError, Error, ValidationError};
use crate::intake::{AttachmentEvent, IntakeAggregator};
use crate::queue::{ClaimResult, Decision, DecisionDispatcher, ReviewQueue, Submission, SubmissionKind, SubmissionStatus};
use crate::channels::telegram::{CallbackQuery, Message, Update};
use crate::status::{DatasetStatus, StatusChecker, StatusReport, StudentRef};
use crate::store::{Store, UserRecord};

const APOLOGY: &str = "⚠️ Что-то пошло не так. Попробуйте ещё раз позже.";

const HELP_TEXT: &str = "Приёмная профкома. Доступные команды:\n\
    /document — подать заявление (приложите фото или файлы)\n\
    /appeal — задать вопрос профкому\n\
    /fee — отправить подтверждение оплаты взноса\n\
    /events — список мероприятий\n\
    /status — статусы ваших заявок на выплаты\n\
    /profile — заполнить данные студбилета";

/// What the next plain message from a chat means.
#[derive(Debug, Clone)]
enum PendingInput {
    /// The user announced a submission; following messages feed the intake.
    /// Once an album has been acked, `active_group` pins the intent to that
    /// album: its remaining messages keep feeding the open buffer, anything
    /// else finds the intent consumed.
    Submission {
        kind: SubmissionKind,
        subject: String,
        related_event_id: Option<i64>,
        active_group: Option<String>,
    },
    /// The user is entering profile data.
    Profile,
    /// A reviewer is typing the reply for an appeal.
    ReviewerReply { submission_id: i64 },
}

pub struct Service {
    api: Arc<TelegramApi>,
    store: Arc<dyn Store>,
    queue: Arc<ReviewQueue>,
    dispatcher: Arc<DecisionDispatcher>,
    aggregator: Arc<IntakeAggregator>,
    checker: Arc<StatusChecker>,
    reviewers: Vec<i64>,
    pending: Mutex<HashMap<i64, PendingInput>>,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<TelegramApi>,
        store: Arc<dyn Store>,
        queue: Arc<ReviewQueue>,
        dispatcher: Arc<DecisionDispatcher>,
        aggregator: Arc<IntakeAggregator>,
        checker: Arc<StatusChecker>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            store,
            queue,
            dispatcher,
            aggregator,
            checker,
            reviewers: config.reviewers.clone(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn is_reviewer(&self, telegram_id: i64) -> bool {
        self.reviewers.contains(&telegram_id)
    }

    /// Long-poll loop. Never returns under normal operation.
    pub async fn run(&self) -> Result<(), Error> {
        self.api.health_check().await?;
        info!("Service loop started");

        let mut offset: i64 = 0;
        loop {
            let updates = match self.api.get_updates(offset, 30).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Update poll failed");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.dispatch(update).await;
            }
        }
    }

    /// Top-level guard: one bad update never takes the loop down.
    async fn dispatch(&self, update: Update) {
        let chat_id = update
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .or_else(|| update.callback_query.as_ref().map(|c| c.from.id));

        let result = self.handle_update(update).await;
        if let Err(e) = result {
            error!(error = %e, "Update handling failed");
            if let Some(chat_id) = chat_id {
                let _ = self.api.send_message(chat_id, APOLOGY, None).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) -> Result<(), Error> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn handle_message(&self, message: Message) -> Result<(), Error> {
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        let user = self
            .store
            .ensure_user(from.id, from.username.as_deref())
            .await?;
        let chat_id = message.chat.id;

        if let Some(text) = message.text.as_deref()
            && text.starts_with('/')
        {
            // A command cancels whatever input was pending for this chat.
            self.pending.lock().await.remove(&chat_id);
            return self.handle_command(chat_id, &user, text.trim()).await;
        }

        let pending = self.pending.lock().await.get(&chat_id).cloned();
        match pending {
            Some(PendingInput::Submission { kind, subject, related_event_id, active_group }) => {
                self.feed_intake(&message, &user, kind, subject, related_event_id, active_group)
                    .await
            }
            Some(PendingInput::Profile) => self.handle_profile_input(chat_id, &from, &message).await,
            Some(PendingInput::ReviewerReply { submission_id }) => {
                self.handle_reviewer_reply(chat_id, &from, submission_id, &message)
                    .await
            }
            None => self.api.send_message(chat_id, HELP_TEXT, None).await.map_err(Into::into),
        }
    }

    async fn handle_command(
        &self,
        chat_id: i64,
        user: &UserRecord,
        command: &str,
    ) -> Result<(), Error> {
        match command {
            "/start" | "/help" => {
                self.api.send_message(chat_id, HELP_TEXT, None).await?;
            }
            "/document" => {
                self.set_pending(
                    chat_id,
                    PendingInput::Submission {
                        kind: SubmissionKind::Document,
                        subject: "Заявление".into(),
                        related_event_id: None,
                        active_group: None,
                    },
                )
                .await;
                self.api
                    .send_message(
                        chat_id,
                        "📄 Отправьте текст заявления и приложите фото или файлы.",
                        None,
                    )
                    .await?;
            }
            "/appeal" => {
                self.set_pending(
                    chat_id,
                    PendingInput::Submission {
                        kind: SubmissionKind::Appeal,
                        subject: "Общие вопросы".into(),
                        related_event_id: None,
                        active_group: None,
                    },
                )
                .await;
                self.api
                    .send_message(chat_id, "✍️ Опишите ваш вопрос одним или несколькими сообщениями.", None)
                    .await?;
            }
            "/fee" => {
                if self
                    .store
                    .has_fee_payment(user.id, SubmissionStatus::Pending)
                    .await?
                    || self
                        .store
                        .has_fee_payment(user.id, SubmissionStatus::Approved)
                        .await?
                {
                    self.api
                        .send_message(chat_id, "У вас уже есть действующая заявка на взнос.", None)
                        .await?;
                    return Ok(());
                }
                self.set_pending(
                    chat_id,
                    PendingInput::Submission {
                        kind: SubmissionKind::FeePayment,
                        subject: "Профсоюзный взнос".into(),
                        related_event_id: None,
                        active_group: None,
                    },
                )
                .await;
                self.api
                    .send_message(chat_id, "💳 Пришлите чек об оплате (фото или файл).", None)
                    .await?;
            }
            "/events" => self.send_event_list(chat_id).await?,
            "/status" => self.send_status_report(chat_id, user).await?,
            "/profile" => {
                self.set_pending(chat_id, PendingInput::Profile).await;
                self.api
                    .send_message(
                        chat_id,
                        "Введите данные одной строкой:\n\
                         <code>Фамилия Имя Отчество; Группа; Номер билета</code>",
                        None,
                    )
                    .await?;
            }
            "/next_fee" | "/next_document" | "/next_appeal" => {
                if !self.is_reviewer(user.telegram_id) {
                    self.api
                        .send_message(chat_id, "Команда доступна только сотрудникам профкома.", None)
                        .await?;
                    return Ok(());
                }
                let kind = match command {
                    "/next_fee" => SubmissionKind::FeePayment,
                    "/next_document" => SubmissionKind::Document,
                    _ => SubmissionKind::Appeal,
                };
                self.present_next(chat_id, kind).await?;
            }
            _ => {
                self.api
                    .send_message(chat_id, "Неизвестная команда. /help — список команд.", None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_pending(&self, chat_id: i64, input: PendingInput) {
        self.pending.lock().await.insert(chat_id, input);
    }

    /// Hand a submission message to the debounce aggregator. Albums share a
    /// `media_group_id` and collapse into one submission; everything else
    /// goes through immediately.
    async fn feed_intake(
        &self,
        message: &Message,
        user: &UserRecord,
        kind: SubmissionKind,
        subject: String,
        related_event_id: Option<i64>,
        active_group: Option<String>,
    ) -> Result<(), Error> {
        let chat_id = message.chat.id;
        let group_key = message.media_group_id.clone();

        // The first album message acks for the whole burst and pins the
        // intent to its group key. Anything outside that album afterwards
        // finds the intent already consumed.
        if let Some(active) = &active_group
            && group_key.as_deref() != Some(active.as_str())
        {
            self.pending.lock().await.remove(&chat_id);
            self.api
                .send_message(
                    chat_id,
                    "Заявка уже принята. Для новой заявки используйте команды из /help.",
                    None,
                )
                .await?;
            return Ok(());
        }

        let attachment = message.attachment();
        let body = message.content().unwrap_or_default().to_string();
        if attachment.is_none() && body.trim().is_empty() {
            return Err(ValidationError::EmptySubmission {
                reason: "message carries neither text nor attachments".into(),
            }
            .into());
        }

        let event = AttachmentEvent {
            owner_id: user.id,
            kind,
            subject: subject.clone(),
            body,
            related_event_id,
            group_key: group_key.clone(),
            seq: message.message_id,
            attachment,
            received_at: Utc::now(),
        };
        self.aggregator.observe(event).await;

        match group_key {
            // Keyless messages are their own burst: enqueued already.
            None => {
                self.pending.lock().await.remove(&chat_id);
            }
            // Later album messages ride the buffer silently.
            Some(_) if active_group.is_some() => return Ok(()),
            Some(key) => {
                self.pending.lock().await.insert(
                    chat_id,
                    PendingInput::Submission {
                        kind,
                        subject,
                        related_event_id,
                        active_group: Some(key),
                    },
                );
            }
        }
        self.api
            .send_message(chat_id, "✅ Заявка принята и поставлена в очередь.", None)
            .await?;
        Ok(())
    }

    async fn handle_profile_input(
        &self,
        chat_id: i64,
        from: &crate::channels::telegram::User,
        message: &Message,
    ) -> Result<(), Error> {
        let text = message.content().unwrap_or_default();
        let Some(profile) = parse_profile(text) else {
            self.api
                .send_message(
                    chat_id,
                    "Не удалось разобрать данные. Формат:\n\
                     <code>Фамилия Имя Отчество; Группа; Номер билета</code>",
                    None,
                )
                .await?;
            return Ok(());
        };

        self.store
            .update_profile(
                from.id,
                &profile.last_name,
                &profile.first_name,
                profile.patronymic.as_deref(),
                &profile.group_name,
                &profile.student_number,
            )
            .await?;
        self.pending.lock().await.remove(&chat_id);
        self.api
            .send_message(chat_id, "✅ Данные сохранены. Теперь доступна команда /status.", None)
            .await?;
        Ok(())
    }

    async fn handle_reviewer_reply(
        &self,
        chat_id: i64,
        from: &crate::channels::telegram::User,
        submission_id: i64,
        message: &Message,
    ) -> Result<(), Error> {
        let text = message.content().unwrap_or_default().trim().to_string();
        if text.is_empty() {
            self.api
                .send_message(chat_id, "Ответ не может быть пустым. Введите текст ответа.", None)
                .await?;
            return Ok(());
        }

        self.pending.lock().await.remove(&chat_id);
        let outcome = self
            .dispatcher
            .apply_decision(submission_id, Decision::Answer, Some(&text), from.id)
            .await;
        self.report_decision(chat_id, submission_id, outcome, SubmissionKind::Appeal)
            .await
    }

    // ── Callbacks ───────────────────────────────────────────────────

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<(), Error> {
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(callback.from.id);
        let reviewer_id = callback.from.id;

        let action = match callback.data.as_deref() {
            Some(data) => CallbackAction::parse(data)?,
            None => return Err(CallbackError::Malformed(String::new()).into()),
        };

        // Ack first so the client's spinner stops even if handling is slow.
        if let Err(e) = self.api.answer_callback(&callback.id, None).await {
            warn!(error = %e, "Callback ack failed");
        }

        match action {
            CallbackAction::FeeApprove(id) | CallbackAction::SubmissionApprove(id) => {
                self.reviewer_decision(chat_id, reviewer_id, id, Decision::Approve)
                    .await
            }
            CallbackAction::FeeReject(id) | CallbackAction::SubmissionReject(id) => {
                self.reviewer_decision(chat_id, reviewer_id, id, Decision::Reject)
                    .await
            }
            CallbackAction::AppealReply(id) => {
                if !self.is_reviewer(reviewer_id) {
                    return Ok(());
                }
                match self.queue.claim(id, reviewer_id).await? {
                    ClaimResult::Claimed(_) => {
                        self.set_pending(chat_id, PendingInput::ReviewerReply { submission_id: id })
                            .await;
                        self.api
                            .send_message(chat_id, "Введите текст ответа на обращение.", None)
                            .await?;
                    }
                    other => self.explain_claim_failure(chat_id, other, SubmissionKind::Appeal).await?,
                }
                Ok(())
            }
            CallbackAction::AppealReadReply(id) => {
                match self.dispatcher.read_reply(id).await? {
                    Some(reply) => {
                        let text = format!("💬 Ответ профкома по обращению #{id}:\n\n{reply}");
                        self.api.send_message(chat_id, &text, None).await?;
                    }
                    None => {
                        self.api
                            .send_message(chat_id, "Ответ уже был прочитан.", None)
                            .await?;
                    }
                }
                Ok(())
            }
            CallbackAction::EventInfo(id) => self.send_event_info(chat_id, reviewer_id, id).await,
            CallbackAction::EventRegister(id) => self.register_for_event(chat_id, reviewer_id, id).await,
            CallbackAction::EventCancel(id) => self.cancel_event(chat_id, reviewer_id, id).await,
        }
    }

    /// Claim-then-decide for approve/reject buttons. A failed claim or a
    /// stale decision re-serves the current head of the queue so the
    /// reviewer's view converges.
    async fn reviewer_decision(
        &self,
        chat_id: i64,
        reviewer_id: i64,
        id: i64,
        decision: Decision,
    ) -> Result<(), Error> {
        if !self.is_reviewer(reviewer_id) {
            return Ok(());
        }

        let kind = match self.queue.store().get_submission(id).await? {
            Some(sub) => sub.kind,
            None => {
                self.api
                    .send_message(chat_id, "Заявка не найдена — возможно, она была отозвана.", None)
                    .await?;
                return Ok(());
            }
        };

        match self.queue.claim(id, reviewer_id).await? {
            ClaimResult::Claimed(_) => {}
            other => return self.explain_claim_failure(chat_id, other, kind).await,
        }

        let outcome = self
            .dispatcher
            .apply_decision(id, decision, None, reviewer_id)
            .await;
        self.report_decision(chat_id, id, outcome, kind).await
    }

    async fn explain_claim_failure(
        &self,
        chat_id: i64,
        result: ClaimResult,
        kind: SubmissionKind,
    ) -> Result<(), Error> {
        let text = match result {
            ClaimResult::AlreadyLocked { by } => {
                format!("Заявку уже рассматривает другой сотрудник ({by}).")
            }
            ClaimResult::AlreadyResolved => "Заявка уже рассмотрена.".to_string(),
            ClaimResult::NotFound => "Заявка не найдена.".to_string(),
            ClaimResult::Claimed(_) => return Ok(()),
        };
        self.api.send_message(chat_id, &text, None).await?;
        self.present_next(chat_id, kind).await
    }

    /// Report a decision outcome and serve the follow-up item it carried.
    async fn report_decision(
        &self,
        chat_id: i64,
        id: i64,
        outcome: Result<crate::queue::DecisionOutcome, Error>,
        kind: SubmissionKind,
    ) -> Result<(), Error> {
        match outcome {
            Ok(outcome) => {
                let mut text = format!(
                    "Заявка #{id}: {}.",
                    status_label(outcome.decided.status)
                );
                if outcome.notify_error.is_some() {
                    text.push_str("\n⚠️ Уведомить заявителя не удалось.");
                }
                self.api.send_message(chat_id, &text, None).await?;
                match outcome.next {
                    Some(next) => self.present_submission(chat_id, &next).await,
                    None => {
                        self.api
                            .send_message(chat_id, "Очередь пуста.", None)
                            .await
                            .map_err(Into::into)
                    }
                }
            }
            Err(Error::Decision(DecisionError::Stale { .. })) => {
                self.api
                    .send_message(chat_id, "Заявка уже рассмотрена другим сотрудником.", None)
                    .await?;
                self.present_next(chat_id, kind).await
            }
            Err(e) => Err(e),
        }
    }

    /// Serve the head of a kind's queue to a reviewer chat.
    async fn present_next(&self, chat_id: i64, kind: SubmissionKind) -> Result<(), Error> {
        match self.queue.next(kind).await? {
            Some(submission) => self.present_submission(chat_id, &submission).await,
            None => self
                .api
                .send_message(chat_id, "Очередь пуста.", None)
                .await
                .map_err(Into::into),
        }
    }

    async fn present_submission(&self, chat_id: i64, submission: &Submission) -> Result<(), Error> {
        let owner = self.store.get_user(submission.owner_id).await?;
        let caption = submission_caption(submission, owner.as_ref());
        let keyboard = decision_keyboard(submission);

        self.api
            .send_attachments(chat_id, &submission.attachments, &caption, Some(keyboard))
            .await?;
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────

    async fn send_event_list(&self, chat_id: i64) -> Result<(), Error> {
        let events = self.store.list_events().await?;
        if events.is_empty() {
            self.api
                .send_message(chat_id, "Пока нет запланированных мероприятий.", None)
                .await?;
            return Ok(());
        }

        let buttons: Vec<serde_json::Value> = events
            .iter()
            .map(|event| {
                serde_json::json!([{
                    "text": event.title,
                    "callback_data": CallbackAction::EventInfo(event.id).encode(),
                }])
            })
            .collect();
        let markup = serde_json::json!({ "inline_keyboard": buttons });
        self.api
            .send_message(chat_id, "🎉 Мероприятия профкома:", Some(markup))
            .await?;
        Ok(())
    }

    async fn send_event_info(
        &self,
        chat_id: i64,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<(), Error> {
        let Some(event) = self.store.get_event(event_id).await? else {
            self.api
                .send_message(chat_id, "Мероприятие не найдено.", None)
                .await?;
            return Ok(());
        };
        let Some(user) = self.store.get_user_by_telegram(telegram_id).await? else {
            return Ok(());
        };

        let registered = self
            .store
            .find_event_registration(user.id, event_id)
            .await?
            .is_some();
        let button = if registered {
            serde_json::json!({
                "text": "❌ Отменить запись",
                "callback_data": CallbackAction::EventCancel(event_id).encode(),
            })
        } else {
            serde_json::json!({
                "text": "✅ Записаться",
                "callback_data": CallbackAction::EventRegister(event_id).encode(),
            })
        };
        let markup = serde_json::json!({ "inline_keyboard": [[button]] });

        let mut text = format!("<b>{}</b>", event.title);
        if let Some(description) = &event.description {
            text.push_str(&format!("\n\n{description}"));
        }
        self.api.send_message(chat_id, &text, Some(markup)).await?;
        Ok(())
    }

    async fn register_for_event(
        &self,
        chat_id: i64,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<(), Error> {
        let Some(user) = self.store.get_user_by_telegram(telegram_id).await? else {
            return Ok(());
        };
        if self
            .store
            .find_event_registration(user.id, event_id)
            .await?
            .is_some()
        {
            self.api
                .send_message(chat_id, "Вы уже записаны на это мероприятие.", None)
                .await?;
            return Ok(());
        }
        let Some(event) = self.store.get_event(event_id).await? else {
            self.api
                .send_message(chat_id, "Мероприятие не найдено.", None)
                .await?;
            return Ok(());
        };

        let new = crate::queue::NewSubmission::new(
            user.id,
            SubmissionKind::EventRegistration,
            event.title.clone(),
        )
        .related_event(event_id);
        self.queue.enqueue(new).await?;
        self.api
            .send_message(
                chat_id,
                &format!("✅ Вы записаны: {}", event.title),
                None,
            )
            .await?;
        Ok(())
    }

    async fn cancel_event(
        &self,
        chat_id: i64,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<(), Error> {
        let Some(user) = self.store.get_user_by_telegram(telegram_id).await? else {
            return Ok(());
        };
        let removed = self
            .store
            .cancel_event_registration(user.id, event_id)
            .await?;
        let text = if removed {
            "Запись отменена."
        } else {
            "Записи на это мероприятие не найдено."
        };
        self.api.send_message(chat_id, text, None).await?;
        Ok(())
    }

    // ── Status ──────────────────────────────────────────────────────

    async fn send_status_report(&self, chat_id: i64, user: &UserRecord) -> Result<(), Error> {
        let (Some(number), Some(last), Some(first)) = (
            user.student_number.as_deref(),
            user.last_name.as_deref(),
            user.first_name.as_deref(),
        ) else {
            self.api
                .send_message(
                    chat_id,
                    "Сначала заполните данные студбилета: /profile",
                    None,
                )
                .await?;
            return Ok(());
        };

        let student = StudentRef {
            student_number: number.to_string(),
            last_name: last.to_string(),
            first_name: first.to_string(),
        };
        let report = self.checker.get_or_fetch(&student).await;
        self.api
            .send_message(chat_id, &format_report(&report), None)
            .await?;
        Ok(())
    }
}

// ── Pure helpers ────────────────────────────────────────────────────

struct ProfileInput {
    last_name: String,
    first_name: String,
    patronymic: Option<String>,
    group_name: String,
    student_number: String,
}

/// Parse "Фамилия Имя [Отчество]; Группа; Номер билета".
fn parse_profile(text: &str) -> Option<ProfileInput> {
    let mut parts = text.split(';').map(str::trim);
    let name = parts.next()?;
    let group_name = parts.next()?.to_string();
    let student_number = parts.next()?.to_string();
    if group_name.is_empty() || student_number.is_empty() {
        return None;
    }

    let mut words = name.split_whitespace();
    let last_name = words.next()?.to_string();
    let first_name = words.next()?.to_string();
    let patronymic = words.next().map(String::from);

    Some(ProfileInput {
        last_name,
        first_name,
        patronymic,
        group_name,
        student_number,
    })
}

fn status_label(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Pending => "в очереди",
        SubmissionStatus::Approved => "одобрена",
        SubmissionStatus::Rejected => "отклонена",
        SubmissionStatus::Answered => "отвечена",
    }
}

fn submission_caption(submission: &Submission, owner: Option<&UserRecord>) -> String {
    let mut caption = format!("📥 Заявка #{} — {}", submission.id, submission.subject);
    if let Some(owner) = owner {
        let name = [owner.last_name.as_deref(), owner.first_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            caption.push_str(&format!("\n👤 {name}"));
        }
        if let Some(group) = &owner.group_name {
            caption.push_str(&format!(" ({group})"));
        }
    }
    if !submission.body.trim().is_empty() {
        caption.push_str(&format!("\n\n{}", submission.body));
    }
    caption
}

/// Inline keyboard matching the submission kind's valid decisions.
fn decision_keyboard(submission: &Submission) -> serde_json::Value {
    let id = submission.id;
    match submission.kind {
        SubmissionKind::Appeal => serde_json::json!({
            "inline_keyboard": [[{
                "text": "✍️ Ответить",
                "callback_data": CallbackAction::AppealReply(id).encode(),
            }]]
        }),
        SubmissionKind::FeePayment => serde_json::json!({
            "inline_keyboard": [[
                { "text": "✅ Принять", "callback_data": CallbackAction::FeeApprove(id).encode() },
                { "text": "❌ Отклонить", "callback_data": CallbackAction::FeeReject(id).encode() },
            ]]
        }),
        _ => serde_json::json!({
            "inline_keyboard": [[
                { "text": "✅ Одобрить", "callback_data": CallbackAction::SubmissionApprove(id).encode() },
                { "text": "❌ Отклонить", "callback_data": CallbackAction::SubmissionReject(id).encode() },
            ]]
        }),
    }
}

fn format_dataset(title: &str, status: &DatasetStatus) -> String {
    match status {
        DatasetStatus::Classified { text, .. } => format!("<b>{title}</b>\n{text}"),
        DatasetStatus::NotSubmitted => format!("<b>{title}</b>\n➖ Заявка не подавалась"),
        DatasetStatus::Unavailable => {
            format!("<b>{title}</b>\n⚠️ Данные временно недоступны")
        }
    }
}

fn format_report(report: &StatusReport) -> String {
    [
        format_dataset("Материальная помощь", &report.material_aid),
        format_dataset("Компенсация проезда", &report.travel_compensation),
        format_dataset("Компенсация проживания", &report.housing_compensation),
    ]
    .join("\n\n")
}
