//! Telegram Bot API client — long-polls for updates, sends messages and
//! stored attachments by file id.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ChannelError;
use crate::queue::model::{AttachmentKind, AttachmentRef};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Shown in place of attachments the Bot API refuses to re-serve.
const ATTACHMENT_FALLBACK: &str = "⚠️ [не удалось отобразить вложения]";

// ── Inbound update types ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub media_group_id: Option<String>,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub document: Option<Document>,
}

impl Message {
    /// Free text of the message: body text, or the caption on a media
    /// message.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Attachment carried by this message, largest photo size preferred.
    pub fn attachment(&self) -> Option<AttachmentRef> {
        if let Some(sizes) = &self.photo
            && let Some(largest) = sizes.last()
        {
            return Some(AttachmentRef::photo(largest.file_id.clone()));
        }
        self.document
            .as_ref()
            .map(|d| AttachmentRef::document(d.file_id.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Telegram keeps photo renditions sorted ascending; the last is largest.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Deserialize)]
struct UpdatesEnvelope {
    #[serde(default)]
    result: Vec<Update>,
}

// ── Client ──────────────────────────────────────────────────────────

/// Bot API HTTP client.
pub struct TelegramApi {
    token: SecretString,
    http: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(token: SecretString, http: reqwest::Client) -> Self {
        Self {
            token,
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url,
            self.token.expose_secret()
        )
    }

    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ChannelError> {
        let response = self
            .http
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        Ok(response)
    }

    /// Long-poll for updates starting after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ChannelError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let response = self.call("getUpdates", &body).await?;
        let envelope: UpdatesEnvelope = response
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        Ok(envelope.result)
    }

    /// Send a text message, HTML-first with plain-text fallback. Splits
    /// messages that exceed Telegram's 4096 char limit; an inline keyboard
    /// goes on the last chunk only.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { reply_markup.as_ref() } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single chunk (≤4096 chars), HTML-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut html_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            html_body["reply_markup"] = markup.clone();
        }

        match self.call("sendMessage", &html_body).await {
            Ok(_) => return Ok(()),
            Err(ChannelError::Http(e)) => return Err(ChannelError::Http(e)),
            Err(ChannelError::Api { status, .. }) => {
                warn!(status, "sendMessage with HTML failed; retrying without parse_mode");
            }
        }

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            plain_body["reply_markup"] = markup.clone();
        }
        self.call("sendMessage", &plain_body).await?;
        Ok(())
    }

    /// Re-serve a stored photo by file id.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "photo": file_id,
        });
        if let Some(cap) = caption {
            body["caption"] = serde_json::Value::String(cap.to_string());
        }
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call("sendPhoto", &body).await?;
        Ok(())
    }

    /// Re-serve a stored document by file id.
    pub async fn send_document(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "document": file_id,
        });
        if let Some(cap) = caption {
            body["caption"] = serde_json::Value::String(cap.to_string());
        }
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call("sendDocument", &body).await?;
        Ok(())
    }

    /// Present a submission's attachments: a single attachment goes out as
    /// a typed send with the caption; several go out as one media group
    /// (caption on the first item). If the Bot API refuses, the caption is
    /// delivered as plain text with a marker in place of the media.
    pub async fn send_attachments(
        &self,
        chat_id: i64,
        attachments: &[AttachmentRef],
        caption: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let result = match attachments {
            [] => {
                return self.send_message(chat_id, caption, reply_markup).await;
            }
            [single] => match single.kind {
                AttachmentKind::Photo => {
                    self.send_photo(chat_id, &single.file_id, Some(caption), reply_markup.clone())
                        .await
                }
                AttachmentKind::Document => {
                    self.send_document(chat_id, &single.file_id, Some(caption), reply_markup.clone())
                        .await
                }
            },
            many => self.send_media_group(chat_id, many, caption, reply_markup.clone()).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(chat_id, error = %e, "Attachment delivery failed; degrading to text");
                let text = format!("{ATTACHMENT_FALLBACK}\n\n{caption}");
                self.send_message(chat_id, &text, reply_markup).await
            }
        }
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        attachments: &[AttachmentRef],
        caption: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let media: Vec<serde_json::Value> = attachments
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let kind = match a.kind {
                    AttachmentKind::Photo => "photo",
                    AttachmentKind::Document => "document",
                };
                let mut item = serde_json::json!({
                    "type": kind,
                    "media": a.file_id,
                });
                if i == 0 {
                    item["caption"] = serde_json::Value::String(caption.to_string());
                }
                item
            })
            .collect();

        let body = serde_json::json!({
            "chat_id": chat_id,
            "media": media,
        });
        self.call("sendMediaGroup", &body).await?;

        // sendMediaGroup cannot carry an inline keyboard; it follows as a
        // separate message.
        if let Some(markup) = reply_markup {
            self.send_message(chat_id, "👇", Some(markup)).await?;
        }
        Ok(())
    }

    /// Acknowledge a callback button press so the client stops its spinner.
    pub async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(t) = text {
            body["text"] = serde_json::Value::String(t.to_string());
        }
        self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    /// Startup probe against getMe.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let response = self
            .http
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("Bot API reachable");
            Ok(())
        } else {
            Err(ChannelError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts. Cut points
/// always land on char boundaries; most of this bot's traffic is Cyrillic,
/// where the byte length runs ahead of the char count.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let hard_cut = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..hard_cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(hard_cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { hard_cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
