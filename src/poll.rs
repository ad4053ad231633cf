use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PollingConfig;
use crate::platform::{IncomingUpdate, MessagingClient};
use crate::router::CommandRouter;

/// Highest update id fetched so far. Process-local, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last_seen: i64,
}

impl Cursor {
    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    /// Offset for the next fetch: everything after the last seen update.
    pub fn next_offset(&self) -> i64 {
        self.last_seen + 1
    }

    /// Move to the highest id in `updates`. Never moves backwards.
    pub fn advance(&mut self, updates: &[IncomingUpdate]) {
        if let Some(max) = updates.iter().map(|u| u.update_id).max() {
            self.last_seen = self.last_seen.max(max);
        }
    }
}

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Counters for one fetch/dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub fetch_failed: bool,
    pub cancelled: bool,
}

/// Serial long-poll loop: fetch, advance the cursor, dispatch each update in order.
pub struct PollLoop {
    client: Arc<dyn MessagingClient>,
    router: CommandRouter,
    clock: Arc<dyn Clock>,
    cursor: Cursor,
    timeout: Duration,
    min_cycle: Duration,
}

impl PollLoop {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        router: CommandRouter,
        clock: Arc<dyn Clock>,
        polling: &PollingConfig,
    ) -> Self {
        Self {
            client,
            router,
            clock,
            cursor: Cursor::default(),
            timeout: polling.timeout(),
            min_cycle: polling.min_cycle(),
        }
    }

    #[cfg(test)]
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run cycles until `shutdown` is cancelled. Returns the final cursor.
    pub async fn run(mut self, shutdown: CancellationToken) -> Cursor {
        info!(
            "Polling for updates from offset {}",
            self.cursor.next_offset()
        );

        let mut cycles: u64 = 0;
        let mut fetched = 0;
        let mut handled = 0;
        let mut failures = 0;
        loop {
            let report = self.run_cycle(&shutdown).await;
            cycles += 1;
            fetched += report.fetched;
            handled += report.dispatched;
            failures += report.failed + usize::from(report.fetch_failed);
            if report.cancelled || shutdown.is_cancelled() {
                break;
            }
        }

        info!(
            "Poll loop stopped after {} cycle(s): {} fetched, {} handled, {} failure(s), last seen update {}",
            cycles,
            fetched,
            handled,
            failures,
            self.cursor.last_seen()
        );
        self.cursor
    }

    /// One fetch/dispatch cycle. No error escapes it.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleReport {
        let started = self.clock.now();
        let mut report = CycleReport::default();
        let offset = self.cursor.next_offset();

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                report.cancelled = true;
                return report;
            }
            result = self.client.fetch_updates(offset, self.timeout) => result,
        };

        match fetched {
            Ok(updates) => {
                report.fetched = updates.len();
                // Advanced before dispatch: an update is never fetched twice, even if its handler dies.
                self.cursor.advance(&updates);
                if !updates.is_empty() {
                    debug!(
                        "Fetched {} update(s), cursor now {}",
                        updates.len(),
                        self.cursor.last_seen()
                    );
                }

                for update in &updates {
                    if shutdown.is_cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    match self.router.dispatch(update).await {
                        Ok(outcome) => {
                            report.dispatched += 1;
                            debug!("Update {} handled: {:?}", update.update_id, outcome);
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!("Error! update {}: {}", update.update_id, e);
                            self.router.report(&format!("Error! {}", e)).await;
                        }
                    }
                }
            }
            Err(e) => {
                report.fetch_failed = true;
                error!("Error! {}", e);
                self.router.report(&format!("Error! {}", e)).await;
            }
        }

        if !report.cancelled {
            report.cancelled = self.pace(started, shutdown).await;
        }
        report
    }

    /// Hold the cycle to at least `min_cycle`. Returns true if cancelled while waiting.
    async fn pace(&self, started: Instant, shutdown: &CancellationToken) -> bool {
        let elapsed = self.clock.now().saturating_duration_since(started);
        if elapsed >= self.min_cycle {
            return false;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => true,
            _ = self.clock.sleep(self.min_cycle - elapsed) => false,
        }
    }
}
