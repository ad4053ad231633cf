use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::{GetUpdatesSetters, SendDocumentSetters};
use teloxide::prelude::*;
use teloxide::types::{InputFile, UpdateKind};
use tracing::debug;

use crate::error::BotError;
use crate::platform::{IncomingUpdate, MessagingClient};

/// Extra time the HTTP client waits beyond the long-poll timeout
const HTTP_GRACE: Duration = Duration::from_secs(10);

/// Telegram Bot API backend
pub struct TelegramClient {
    /// Long-poll and short text requests
    bot: Bot,
    /// Photo and document uploads
    uploads: Bot,
}

impl TelegramClient {
    /// `poll_timeout` bounds the long-poll; media uploads get `upload_timeout` instead.
    pub fn new(token: &str, poll_timeout: Duration, upload_timeout: Duration) -> Result<Self> {
        Ok(Self {
            bot: bot_with_timeout(token, poll_timeout + HTTP_GRACE)?,
            uploads: bot_with_timeout(token, upload_timeout)?,
        })
    }
}

fn bot_with_timeout(token: &str, timeout: Duration) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client for Telegram")?;
    Ok(Bot::with_client(token, client))
}

/// Flatten a Telegram update into the fields the router looks at
fn to_incoming(update: &Update) -> IncomingUpdate {
    let update_id = i64::from(update.id.0);
    match &update.kind {
        UpdateKind::Message(msg) => {
            IncomingUpdate::message(update_id, msg.chat.id.0, msg.text().unwrap_or_default())
        }
        _ => IncomingUpdate {
            update_id,
            chat_id: None,
            text: String::new(),
        },
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>, BotError> {
        let offset = i32::try_from(offset).map_err(|e| BotError::backend("getUpdates", e))?;
        let timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);

        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(timeout)
            .await
            .map_err(|e| BotError::backend("getUpdates", e))?;

        debug!("Fetched {} update(s) from offset {}", updates.len(), offset);
        Ok(updates.iter().map(to_incoming).collect())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| BotError::backend("sendMessage", e))
    }

    async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), BotError> {
        self.uploads
            .send_photo(ChatId(chat_id), InputFile::file(path))
            .await
            .map(|_| ())
            .map_err(|e| BotError::backend("sendPhoto", e))
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        disable_content_type_detection: bool,
    ) -> Result<(), BotError> {
        let document = InputFile::file(path).file_name(file_name.to_string());
        self.uploads
            .send_document(ChatId(chat_id), document)
            .disable_content_type_detection(disable_content_type_detection)
            .await
            .map(|_| ())
            .map_err(|e| BotError::backend("sendDocument", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_message_update_is_flattened() {
        let update = parse(
            r#"{
                "update_id": 892252934,
                "message": {
                    "message_id": 6557,
                    "from": {
                        "id": 218485655,
                        "is_bot": false,
                        "first_name": "Tester",
                        "username": "tester",
                        "language_code": "en"
                    },
                    "chat": {
                        "id": 218485655,
                        "first_name": "Tester",
                        "username": "tester",
                        "type": "private"
                    },
                    "date": 1594841327,
                    "text": "Photo"
                }
            }"#,
        );

        assert_eq!(
            to_incoming(&update),
            IncomingUpdate::message(892252934, 218485655, "Photo")
        );
    }

    #[test]
    fn test_message_without_text_has_empty_text() {
        let update = parse(
            r#"{
                "update_id": 11,
                "message": {
                    "message_id": 7,
                    "from": {
                        "id": 42,
                        "is_bot": false,
                        "first_name": "Tester"
                    },
                    "chat": {
                        "id": 42,
                        "first_name": "Tester",
                        "type": "private"
                    },
                    "date": 1594841327,
                    "photo": [
                        {
                            "file_id": "AgADBAADr6cxG2wMWFM",
                            "file_unique_id": "AQADr6cxG2wMWFMAAQ",
                            "file_size": 1024,
                            "width": 90,
                            "height": 67
                        }
                    ]
                }
            }"#,
        );

        assert_eq!(to_incoming(&update), IncomingUpdate::message(11, 42, ""));
    }

    #[test]
    fn test_update_without_message_has_no_chat() {
        let update = parse(r#"{"update_id": 12, "some_future_update": {"value": 1}}"#);

        let incoming = to_incoming(&update);
        assert_eq!(incoming.update_id, 12);
        assert_eq!(incoming.chat_id, None);
        assert!(incoming.text.is_empty());
    }

    #[test]
    fn test_client_has_separate_upload_timeout() {
        let client = TelegramClient::new(
            "123456:TEST-TOKEN",
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        assert!(client.is_ok());
    }
}
