//! Suspension points between failed attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;

use crate::config::{ContinuationMode, RetryConfig};
use crate::error::{CiFixError, Result};

/// How often a [`SignalFileGate`] checks for its file.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Blocks the retry loop until the next attempt may start.
#[async_trait]
pub trait FixGate: Send + Sync {
    /// `attempt` is the attempt that just failed.
    async fn wait_for_fix(&self, attempt: u32) -> Result<()>;
}

/// Waits for Enter on stdin. No timeout.
pub struct StdinGate {
    report_path: PathBuf,
}

impl StdinGate {
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
        }
    }
}

#[async_trait]
impl FixGate for StdinGate {
    async fn wait_for_fix(&self, attempt: u32) -> Result<()> {
        eprintln!(
            "Attempt {attempt} failed. Fix the errors listed in {}, then press Enter to retry.",
            self.report_path.display()
        );

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(CiFixError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for a fix",
            )));
        }
        Ok(())
    }
}

/// Sleeps a fixed duration before every retry.
pub struct DelayGate {
    delay: Duration,
}

impl DelayGate {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl FixGate for DelayGate {
    async fn wait_for_fix(&self, attempt: u32) -> Result<()> {
        info!(
            "Attempt {attempt} failed, retrying in {}s",
            self.delay.as_secs()
        );
        sleep(self.delay).await;
        Ok(())
    }
}

/// Waits until a signal file exists, then removes it.
pub struct SignalFileGate {
    path: PathBuf,
    poll_interval: Duration,
}

impl SignalFileGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: SIGNAL_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl FixGate for SignalFileGate {
    async fn wait_for_fix(&self, attempt: u32) -> Result<()> {
        info!(
            "Attempt {attempt} failed; create {} to continue",
            self.path.display()
        );

        while tokio::fs::metadata(&self.path).await.is_err() {
            sleep(self.poll_interval).await;
        }

        debug!("Consuming signal file {}", self.path.display());
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }
}

pub fn gate_for(retry: &RetryConfig, report_path: &Path) -> Box<dyn FixGate> {
    match retry.mode {
        ContinuationMode::Manual => Box::new(StdinGate::new(report_path)),
        ContinuationMode::Auto => Box::new(DelayGate::new(retry.auto_delay())),
        ContinuationMode::Signal => Box::new(SignalFileGate::new(&retry.signal_file)),
    }
}

/// Exponential backoff, `base * 2^(attempt - 1)`, capped at `max`.
#[must_use]
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = 2u32.saturating_pow(exponent);
    base.saturating_mul(multiplier).min(max)
}
