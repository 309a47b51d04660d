//! Progress reporting and the process-wide run status.
//!
//! The harvest loop only sees a [`ProgressSink`]. The dashboard owns a
//! [`StatusBoard`], which is also a sink, and hands out at most one
//! [`RunToken`] at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Receives `(current, total, message)` updates from a harvest.
pub trait ProgressSink: Send + Sync {
    fn report(&self, current: usize, total: usize, message: &str) -> anyhow::Result<()>;
}

/// Forward to `sink`, swallowing its failures: progress must never fail a run.
pub fn notify(sink: &dyn ProgressSink, current: usize, total: usize, message: &str) {
    if let Err(e) = sink.report(current, total, message) {
        debug!("progress sink rejected update: {}", e);
    }
}

/// Sink that only logs. Used by the CLI mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, current: usize, total: usize, message: &str) -> anyhow::Result<()> {
        info!("Progress: {}/{} - {}", current, total, message);
        Ok(())
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _: usize, _: usize, _: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub is_running: bool,
    pub progress: usize,
    pub total: usize,
    pub message: String,
    pub last_update: Option<String>,
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Harvest already running")]
pub struct AlreadyRunning;

/// Process-wide run status plus the single-flight flag.
#[derive(Debug, Default)]
pub struct StatusBoard {
    status: RwLock<RunStatus>,
    running: AtomicBool,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Read-only snapshot of the current status.
    pub fn status(&self) -> RunStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the single run slot. A second claim while a token is alive is
    /// rejected without touching the status.
    pub fn try_begin(self: &Arc<Self>, total: usize) -> Result<RunToken, AlreadyRunning> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        self.update(|s| {
            *s = RunStatus {
                is_running: true,
                progress: 0,
                total,
                message: "Starting harvest...".to_string(),
                last_update: Some(Utc::now().to_rfc3339()),
                run_id: Some(run_id),
            };
        });
        info!(%run_id, total, "harvest run started");
        Ok(RunToken {
            board: Arc::clone(self),
            run_id,
        })
    }

    fn update(&self, f: impl FnOnce(&mut RunStatus)) {
        let mut guard = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    /// Push-style view: the current status right away, then once per `tick`
    /// while a run is active, then one last time after it ends.
    pub fn stream(self: Arc<Self>, tick: Duration) -> impl Stream<Item = RunStatus> + Send {
        futures::stream::unfold((self, false, false), move |(board, started, done)| async move {
            if done {
                return None;
            }
            if started {
                tokio::time::sleep(tick).await;
            }
            let status = board.status();
            let finished = !status.is_running;
            Some((status, (board, true, finished)))
        })
    }
}

impl ProgressSink for StatusBoard {
    fn report(&self, current: usize, total: usize, message: &str) -> anyhow::Result<()> {
        self.update(|s| {
            s.progress = current;
            s.total = total;
            s.message = message.to_string();
            s.last_update = Some(Utc::now().to_rfc3339());
        });
        Ok(())
    }
}

/// Proof of owning the run slot. Dropping it clears `is_running`.
#[derive(Debug)]
pub struct RunToken {
    board: Arc<StatusBoard>,
    run_id: Uuid,
}

impl RunToken {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Record the run's final message and release the slot.
    pub fn finish(self, message: impl Into<String>) {
        let message = message.into();
        info!(run_id = %self.run_id, "harvest run finished: {}", message);
        self.board.update(|s| {
            s.message = message;
            s.last_update = Some(Utc::now().to_rfc3339());
        });
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.board.update(|s| s.is_running = false);
        self.board.running.store(false, Ordering::Release);
    }
}
