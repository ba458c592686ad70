//! Out-of-band model snapshots.
//!
//! The engine writes a model when it reads a `save_<path>` line but never
//! acknowledges it, so the only completion signal is the file showing up.
//! [`SnapshotPoller`] turns that into a bounded retry loop: check, sleep for
//! the poll interval, give up once the budget is spent.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outcome of a single poll.
#[derive(Debug, PartialEq)]
pub enum PollState {
    /// Nothing yet; `attempts` checks have been made so far
    Waiting { attempts: u32 },
    /// The artifact appeared and was read
    Ready(Vec<u8>),
    /// The budget elapsed before the artifact appeared
    TimedOut,
}

/// Polls for a snapshot artifact at a fixed interval until a deadline.
#[derive(Debug)]
pub struct SnapshotPoller {
    path: PathBuf,
    interval: Duration,
    timeout: Duration,
    started: Instant,
    attempts: u32,
}

impl SnapshotPoller {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            timeout,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// One check of the file system.
    ///
    /// A zero-length file is treated as not written yet.
    pub async fn check(&mut self) -> Result<PollState> {
        self.attempts += 1;

        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.len() > 0 => {
                let bytes = tokio::fs::read(&self.path).await?;
                debug!(
                    path = %self.path.display(),
                    bytes = bytes.len(),
                    attempts = self.attempts,
                    "Read model from temporary file"
                );
                if let Err(e) = tokio::fs::remove_file(&self.path).await {
                    warn!("Failed to remove snapshot {}: {}", self.path.display(), e);
                }
                return Ok(PollState::Ready(bytes));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if self.started.elapsed() >= self.timeout {
            Ok(PollState::TimedOut)
        } else {
            Ok(PollState::Waiting {
                attempts: self.attempts,
            })
        }
    }

    /// Poll until the artifact appears or the budget is spent.
    pub async fn wait(mut self) -> Result<Vec<u8>> {
        loop {
            match self.check().await? {
                PollState::Ready(bytes) => return Ok(bytes),
                PollState::TimedOut => {
                    return Err(Error::SnapshotTimeout {
                        path: self.path,
                        waited: self.started.elapsed(),
                    })
                }
                PollState::Waiting { .. } => tokio::time::sleep(self.interval).await,
            }
        }
    }
}

/// Hands out fresh snapshot paths inside a directory owned by one adapter.
#[derive(Debug)]
pub struct SnapshotPaths {
    dir: PathBuf,
    counter: AtomicU64,
}

impl SnapshotPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.dir.join(format!("snapshot-{}.model", n))
    }
}
