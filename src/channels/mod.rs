//! Outbound channel abstraction — notification trait and the Telegram client.

pub mod notify;
pub mod telegram;

pub use notify::{Notifier, TelegramNotifier};
pub use telegram::TelegramApi;
