use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::CameraConfig;
use crate::error::BotError;

/// Upper bound for a single still capture, device warm-up included
const STILL_DEADLINE: Duration = Duration::from_secs(30);

/// Time a recording may overrun its requested duration before it is killed
const VIDEO_GRACE: Duration = Duration::from_secs(30);

/// stderr fragments that mean the device itself could not be opened
const DEVICE_OPEN_FAILURES: &[&str] = &[
    "no such file or directory",
    "device or resource busy",
    "permission denied",
    "cannot open",
    "could not find video device",
    "could not open",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Photo,
    Video { duration_secs: u64 },
}

/// One capture, built and owned by a single handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: CaptureKind,
    pub destination: PathBuf,
}

impl CaptureRequest {
    pub fn photo(destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: CaptureKind::Photo,
            destination: destination.into(),
        }
    }

    pub fn video(destination: impl Into<PathBuf>, duration_secs: u64) -> Self {
        Self {
            kind: CaptureKind::Video { duration_secs },
            destination: destination.into(),
        }
    }
}

/// Access to the attached camera. Each call opens the device and releases it before returning.
#[async_trait]
pub trait CaptureService: Send + Sync {
    async fn capture_still(&self, destination: &Path) -> Result<(), BotError>;

    async fn capture_video(&self, destination: &Path, duration_secs: u64) -> Result<(), BotError>;

    async fn capture(&self, request: &CaptureRequest) -> Result<(), BotError> {
        match request.kind {
            CaptureKind::Photo => self.capture_still(&request.destination).await,
            CaptureKind::Video { duration_secs } => {
                self.capture_video(&request.destination, duration_secs)
                    .await
            }
        }
    }
}

/// Camera driven through an `ffmpeg` child process.
pub struct FfmpegCamera {
    config: CameraConfig,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    fn input_args(&self, width: u32, height: u32) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            self.config.input_format.clone(),
            "-video_size".to_string(),
            format!("{}x{}", width, height),
        ]
    }

    fn still_args(&self, destination: &Path) -> Vec<String> {
        let mut args = self.input_args(self.config.photo_width, self.config.photo_height);
        args.extend([
            "-i".to_string(),
            self.config.device.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
            destination.display().to_string(),
        ]);
        args
    }

    fn video_args(&self, destination: &Path, duration_secs: u64) -> Vec<String> {
        let mut args = self.input_args(self.config.video_width, self.config.video_height);
        args.extend([
            "-framerate".to_string(),
            self.config.video_fps.to_string(),
            "-i".to_string(),
            self.config.device.clone(),
            "-t".to_string(),
            duration_secs.to_string(),
            "-c:v".to_string(),
            "mpeg4".to_string(),
            "-q:v".to_string(),
            "5".to_string(),
            destination.display().to_string(),
        ]);
        args
    }

    async fn run(
        &self,
        args: Vec<String>,
        destination: &Path,
        deadline: Duration,
    ) -> Result<(), BotError> {
        prepare_destination(destination).await?;

        let program = &self.config.program;
        debug!("capture: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BotError::DeviceUnavailable(format!(
                    "failed to start {}: {}",
                    program, e
                )))
            }
            Err(_) => {
                return Err(BotError::CaptureFrame(format!(
                    "{} did not finish within {}s",
                    program,
                    deadline.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, output.status.code()));
        }

        match tokio::fs::metadata(destination).await {
            Ok(meta) if meta.len() > 0 => {
                info!(
                    "Captured {} ({} bytes)",
                    destination.display(),
                    meta.len()
                );
                Ok(())
            }
            _ => Err(BotError::CaptureFrame(format!(
                "no data written to {}",
                destination.display()
            ))),
        }
    }
}

#[async_trait]
impl CaptureService for FfmpegCamera {
    async fn capture_still(&self, destination: &Path) -> Result<(), BotError> {
        let args = self.still_args(destination);
        self.run(args, destination, STILL_DEADLINE).await
    }

    async fn capture_video(&self, destination: &Path, duration_secs: u64) -> Result<(), BotError> {
        let args = self.video_args(destination, duration_secs);
        let deadline = Duration::from_secs(duration_secs) + VIDEO_GRACE;
        self.run(args, destination, deadline).await
    }
}

/// Make sure the parent exists and no stale file from an earlier capture is left behind.
async fn prepare_destination(destination: &Path) -> Result<(), BotError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            BotError::CaptureFrame(format!(
                "failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    match tokio::fs::remove_file(destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BotError::CaptureFrame(format!(
            "failed to remove stale {}: {}",
            destination.display(),
            e
        ))),
    }
}

fn classify_failure(stderr: &str, code: Option<i32>) -> BotError {
    let detail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        });

    let lowered = stderr.to_lowercase();
    if DEVICE_OPEN_FAILURES.iter().any(|needle| lowered.contains(needle)) {
        BotError::DeviceUnavailable(detail)
    } else {
        BotError::CaptureFrame(detail)
    }
}
