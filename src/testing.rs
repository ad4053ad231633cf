//! Recording fakes for the messaging backend, camera and clock.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::camera::CaptureService;
use crate::error::BotError;
use crate::platform::{IncomingUpdate, MessagingClient};
use crate::poll::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch {
        offset: i64,
    },
    Text {
        chat_id: i64,
        text: String,
    },
    Photo {
        chat_id: i64,
        path: PathBuf,
    },
    Document {
        chat_id: i64,
        path: PathBuf,
        file_name: String,
        disable_content_type_detection: bool,
    },
    Still {
        path: PathBuf,
    },
    Video {
        path: PathBuf,
        duration_secs: u64,
    },
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

pub fn text(chat_id: i64, text: &str) -> Call {
    Call::Text {
        chat_id,
        text: text.to_string(),
    }
}

/// Serves queued fetch results in order, then empty batches.
pub struct FakeMessenger {
    log: CallLog,
    batches: Mutex<VecDeque<Result<Vec<IncomingUpdate>, BotError>>>,
    failing_chats: HashSet<i64>,
    cancel_when_drained: Option<CancellationToken>,
}

impl FakeMessenger {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            batches: Mutex::new(VecDeque::new()),
            failing_chats: HashSet::new(),
            cancel_when_drained: None,
        }
    }

    pub fn with_batch(self, batch: Vec<IncomingUpdate>) -> Self {
        self.batches.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub fn with_fetch_error(self, message: &str) -> Self {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(BotError::backend("getUpdates", message)));
        self
    }

    /// Every send to `chat_id` fails.
    pub fn failing_sends_to(mut self, chat_id: i64) -> Self {
        self.failing_chats.insert(chat_id);
        self
    }

    /// Cancel `token` on the first fetch after the queue runs dry.
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_when_drained = Some(token);
        self
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn check_send(&self, op: &'static str, chat_id: i64) -> Result<(), BotError> {
        if self.failing_chats.contains(&chat_id) {
            Err(BotError::backend(op, "chat not found"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessagingClient for FakeMessenger {
    async fn fetch_updates(
        &self,
        offset: i64,
        _timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>, BotError> {
        self.record(Call::Fetch { offset });
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(token) = &self.cancel_when_drained {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.record(Call::Text {
            chat_id,
            text: text.to_string(),
        });
        self.check_send("sendMessage", chat_id)
    }

    async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), BotError> {
        self.record(Call::Photo {
            chat_id,
            path: path.to_path_buf(),
        });
        self.check_send("sendPhoto", chat_id)
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        disable_content_type_detection: bool,
    ) -> Result<(), BotError> {
        self.record(Call::Document {
            chat_id,
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            disable_content_type_detection,
        });
        self.check_send("sendDocument", chat_id)
    }
}

/// Records captures; fails for destinations registered with `failing_for`.
pub struct FakeCamera {
    log: CallLog,
    failing: HashSet<PathBuf>,
    clock: Option<Arc<FakeClock>>,
}

impl FakeCamera {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            failing: HashSet::new(),
            clock: None,
        }
    }

    pub fn failing_for(mut self, destination: impl Into<PathBuf>) -> Self {
        self.failing.insert(destination.into());
        self
    }

    /// Recordings advance `clock` by their duration.
    pub fn with_clock(mut self, clock: Arc<FakeClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn outcome(&self, destination: &Path) -> Result<(), BotError> {
        if self.failing.contains(destination) {
            Err(BotError::DeviceUnavailable("Could not open camera".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CaptureService for FakeCamera {
    async fn capture_still(&self, destination: &Path) -> Result<(), BotError> {
        self.log.lock().unwrap().push(Call::Still {
            path: destination.to_path_buf(),
        });
        self.outcome(destination)
    }

    async fn capture_video(&self, destination: &Path, duration_secs: u64) -> Result<(), BotError> {
        self.log.lock().unwrap().push(Call::Video {
            path: destination.to_path_buf(),
            duration_secs,
        });
        if let Some(clock) = &self.clock {
            clock.advance(Duration::from_secs(duration_secs));
        }
        self.outcome(destination)
    }
}

/// Manually advanced clock whose `sleep` returns immediately.
pub struct FakeClock {
    base: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}
