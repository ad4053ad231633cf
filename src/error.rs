use std::fmt::Display;

use thiserror::Error;

/// Failures raised while talking to the chat backend or the camera.
#[derive(Debug, Error)]
pub enum BotError {
    /// Fetch or send against the messaging backend failed.
    #[error("{op} failed: {message}")]
    Backend { op: &'static str, message: String },

    /// The capture device (or the program driving it) could not be opened.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device opened but produced no usable frame or file.
    #[error("capture failed: {0}")]
    CaptureFrame(String),
}

impl BotError {
    pub fn backend(op: &'static str, err: impl Display) -> Self {
        BotError::Backend {
            op,
            message: err.to_string(),
        }
    }
}
