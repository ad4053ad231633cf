pub mod telegram;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BotError;

/// An update received from the chat backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpdate {
    /// Monotonically increasing identifier assigned by the backend
    pub update_id: i64,
    /// Originating chat; `None` for updates that are not tied to a chat
    pub chat_id: Option<i64>,
    /// Message text, empty when the message carries none
    pub text: String,
}

impl IncomingUpdate {
    pub fn message(update_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            update_id,
            chat_id: Some(chat_id),
            text: text.into(),
        }
    }
}

/// Everything the bot needs from a chat backend.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Long-poll for updates with `update_id >= offset`, waiting up to `timeout`.
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>, BotError>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError>;

    async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), BotError>;

    /// Send `path` as a generic attachment named `file_name`.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        disable_content_type_detection: bool,
    ) -> Result<(), BotError>;
}
