use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that supplies (or overrides) the bot token.
pub const TOKEN_ENV: &str = "BOT_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_camera_config")]
    pub camera: CameraConfig,
    #[serde(default = "default_polling_config")]
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat that receives every operational notice.
    pub admin_chat_id: i64,
    #[serde(default)]
    pub allowed_chat_ids: HashSet<i64>,
    /// HTTP timeout for photo and video uploads, separate from the long-poll timeout.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// ffmpeg input device format: "v4l2" on Linux, "dshow" on Windows, "avfoundation" on macOS.
    #[serde(default = "default_input_format")]
    pub input_format: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_photo_width")]
    pub photo_width: u32,
    #[serde(default = "default_photo_height")]
    pub photo_height: u32,
    #[serde(default = "default_video_width")]
    pub video_width: u32,
    #[serde(default = "default_video_height")]
    pub video_height: u32,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    #[serde(default = "default_video_duration_secs")]
    pub video_duration_secs: u64,
    #[serde(default = "default_media_directory")]
    pub media_directory: PathBuf,
    /// Tell the requesting chat when a capture fails. Off by default: only the admin hears about it.
    #[serde(default)]
    pub notify_on_failure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_cycle_secs")]
    pub min_cycle_secs: u64,
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_cycle(&self) -> Duration {
        Duration::from_secs(self.min_cycle_secs)
    }
}

fn default_upload_timeout_secs() -> u64 {
    300
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_input_format() -> String {
    if cfg!(windows) {
        "dshow".to_string()
    } else {
        "v4l2".to_string()
    }
}

fn default_device() -> String {
    if cfg!(windows) {
        "video=Integrated Camera".to_string()
    } else {
        "/dev/video0".to_string()
    }
}

fn default_photo_width() -> u32 {
    1280
}

fn default_photo_height() -> u32 {
    960
}

fn default_video_width() -> u32 {
    640
}

fn default_video_height() -> u32 {
    480
}

fn default_video_fps() -> u32 {
    20
}

fn default_video_duration_secs() -> u64 {
    15
}

fn default_media_directory() -> PathBuf {
    PathBuf::from("media")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_min_cycle_secs() -> u64 {
    1
}

fn default_camera_config() -> CameraConfig {
    CameraConfig {
        program: default_program(),
        input_format: default_input_format(),
        device: default_device(),
        photo_width: default_photo_width(),
        photo_height: default_photo_height(),
        video_width: default_video_width(),
        video_height: default_video_height(),
        video_fps: default_video_fps(),
        video_duration_secs: default_video_duration_secs(),
        media_directory: default_media_directory(),
        notify_on_failure: false,
    }
}

fn default_polling_config() -> PollingConfig {
    PollingConfig {
        timeout_secs: default_timeout_secs(),
        min_cycle_secs: default_min_cycle_secs(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content, std::env::var(TOKEN_ENV).ok())?;

        if !config.camera.media_directory.exists() {
            std::fs::create_dir_all(&config.camera.media_directory).with_context(|| {
                format!(
                    "Failed to create media directory: {}",
                    config.camera.media_directory.display()
                )
            })?;
        }

        Ok(config)
    }

    /// Parse TOML content. A non-empty `env_token` wins over the file's `bot_token`.
    pub fn parse(content: &str, env_token: Option<String>) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            config.telegram.bot_token = token;
        }

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "No bot token configured: set telegram.bot_token or the {} environment variable",
                TOKEN_ENV
            );
        }

        if config.camera.video_duration_secs == 0 {
            anyhow::bail!("camera.video_duration_secs must be at least 1");
        }

        Ok(config)
    }
}
