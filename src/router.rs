use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::camera::{CaptureRequest, CaptureService};
use crate::config::Config;
use crate::error::BotError;
use crate::platform::{IncomingUpdate, MessagingClient};

pub const UNSUPPORTED_REPLY: &str = "Unsupported command. Photo or Video only.";
pub const CAPTURE_FAILED_REPLY: &str = "Capture failed, please try again later.";
pub const VIDEO_FILE_NAME: &str = "record.mp4";

/// Commands understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Photo,
    Video,
    Unsupported,
}

impl Command {
    /// Case-insensitive exact match after trimming.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("photo") {
            Command::Photo
        } else if text.eq_ignore_ascii_case("video") {
            Command::Video
        } else {
            Command::Unsupported
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    Admin,
    Authorized,
    Unknown,
}

/// Static partition of chat identities, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admin: i64,
    authorized: HashSet<i64>,
}

impl AccessPolicy {
    pub fn new(admin: i64, authorized: impl IntoIterator<Item = i64>) -> Self {
        Self {
            admin,
            authorized: authorized.into_iter().collect(),
        }
    }

    pub fn admin(&self) -> i64 {
        self.admin
    }

    /// Only allow-listed chats are `Authorized`. An admin missing from the
    /// allow-list is just the report sink and may not issue commands.
    pub fn role(&self, chat_id: i64) -> ChatRole {
        if self.authorized.contains(&chat_id) {
            ChatRole::Authorized
        } else if chat_id == self.admin {
            ChatRole::Admin
        } else {
            ChatRole::Unknown
        }
    }
}

/// What happened to a routed update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The update had no chat to answer.
    Ignored,
    /// Sender is not allow-listed; the admin was told.
    Rejected,
    /// Unsupported command; guidance was sent.
    Replied,
    PhotoSent,
    VideoSent,
}

/// Classifies updates and runs the matching handler, one at a time.
pub struct CommandRouter {
    client: Arc<dyn MessagingClient>,
    camera: Arc<dyn CaptureService>,
    access: AccessPolicy,
    media_directory: PathBuf,
    video_duration_secs: u64,
    notify_on_failure: bool,
}

impl CommandRouter {
    pub fn new(
        config: &Config,
        client: Arc<dyn MessagingClient>,
        camera: Arc<dyn CaptureService>,
    ) -> Self {
        Self {
            client,
            camera,
            access: AccessPolicy::new(
                config.telegram.admin_chat_id,
                config.telegram.allowed_chat_ids.iter().copied(),
            ),
            media_directory: config.camera.media_directory.clone(),
            video_duration_secs: config.camera.video_duration_secs,
            notify_on_failure: config.camera.notify_on_failure,
        }
    }

    pub fn photo_path(&self, chat_id: i64) -> PathBuf {
        self.media_directory.join(format!("{}.jpg", chat_id))
    }

    pub fn video_path(&self, chat_id: i64) -> PathBuf {
        self.media_directory.join(format!("{}.mp4", chat_id))
    }

    pub async fn dispatch(&self, update: &IncomingUpdate) -> Result<Outcome, BotError> {
        let chat_id = match update.chat_id {
            Some(id) => id,
            None => {
                debug!("Ignoring update {} without a chat", update.update_id);
                return Ok(Outcome::Ignored);
            }
        };

        if self.access.role(chat_id) != ChatRole::Authorized {
            warn!("Unrecognized Chat ID: {}", chat_id);
            self.report(&format!("Unrecognized Chat ID: {}", chat_id))
                .await;
            return Ok(Outcome::Rejected);
        }

        let command = Command::parse(&update.text);
        info!(
            "Update {} from chat {}: {:?} ({:?})",
            update.update_id, chat_id, update.text, command
        );

        match command {
            Command::Photo => self.handle_photo(chat_id).await,
            Command::Video => self.handle_video(chat_id).await,
            Command::Unsupported => {
                self.notify(chat_id, UNSUPPORTED_REPLY).await;
                Ok(Outcome::Replied)
            }
        }
    }

    async fn handle_photo(&self, chat_id: i64) -> Result<Outcome, BotError> {
        let request = CaptureRequest::photo(self.photo_path(chat_id));

        self.notify(chat_id, "Taking Photo").await;
        self.capture(chat_id, &request).await?;

        self.notify(chat_id, "Photo Sending").await;
        self.client
            .send_photo(chat_id, &request.destination)
            .await?;
        Ok(Outcome::PhotoSent)
    }

    async fn handle_video(&self, chat_id: i64) -> Result<Outcome, BotError> {
        let request = CaptureRequest::video(self.video_path(chat_id), self.video_duration_secs);

        self.notify(chat_id, "Recording Video").await;
        self.capture(chat_id, &request).await?;

        self.notify(chat_id, "Video Sending").await;
        self.client
            .send_document(chat_id, &request.destination, VIDEO_FILE_NAME, true)
            .await?;
        Ok(Outcome::VideoSent)
    }

    async fn capture(&self, chat_id: i64, request: &CaptureRequest) -> Result<(), BotError> {
        if let Err(e) = self.camera.capture(request).await {
            error!(
                "Capture for chat {} into {} failed: {}",
                chat_id,
                request.destination.display(),
                e
            );
            if self.notify_on_failure {
                self.notify(chat_id, CAPTURE_FAILED_REPLY).await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Best-effort text to a chat; failures are logged, never propagated.
    pub async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.client.send_text(chat_id, text).await {
            error!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }

    /// Best-effort notice to the admin chat.
    pub async fn report(&self, text: &str) {
        self.notify(self.access.admin(), text).await;
    }
}
