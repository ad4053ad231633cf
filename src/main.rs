mod camera;
mod config;
mod error;
mod platform;
mod poll;
mod router;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::camera::{CaptureService, FfmpegCamera};
use crate::config::Config;
use crate::platform::telegram::TelegramClient;
use crate::platform::MessagingClient;
use crate::poll::{PollLoop, SystemClock};
use crate::router::CommandRouter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,camtrigger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Admin chat: {}", config.telegram.admin_chat_id);
    info!("  Allowed chats: {:?}", config.telegram.allowed_chat_ids);
    info!(
        "  Camera: {} -f {} -i {}",
        config.camera.program, config.camera.input_format, config.camera.device
    );
    info!("  Media: {}", config.camera.media_directory.display());

    let client: Arc<dyn MessagingClient> = Arc::new(TelegramClient::new(
        &config.telegram.bot_token,
        config.polling.timeout(),
        config.telegram.upload_timeout(),
    )?);
    let camera: Arc<dyn CaptureService> = Arc::new(FfmpegCamera::new(config.camera.clone()));
    let router = CommandRouter::new(&config, client.clone(), camera);
    let poll = PollLoop::new(client, router, Arc::new(SystemClock), &config.polling);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal.cancel();
    });

    info!("Bot is starting...");
    poll.run(shutdown).await;

    Ok(())
}
