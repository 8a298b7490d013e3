//! Commit, push, poll and retry until CI is green or the budget runs out.

pub mod continuation;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::error::Result;
use crate::extract::{ErrorReport, ReportFormat};
use crate::poller::{PollOutcome, Poller, RunFailure};
use crate::providers::WorkflowRun;
use crate::vcs::{CommitRef, Vcs};

use self::continuation::{calculate_backoff, FixGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Where failed-run reports are persisted. Each write replaces the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub path: PathBuf,
    pub format: ReportFormat,
}

/// Progress of one orchestrator run; reset only by restarting the process.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// 1-based once the first attempt has started.
    pub attempt: u32,
    pub last_commit: Option<CommitRef>,
    pub last_report: Option<ErrorReport>,
}

#[derive(Debug, Clone)]
pub enum LoopOutcome {
    Succeeded {
        run: WorkflowRun,
        commit: CommitRef,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_report: Option<ErrorReport>,
    },
}

/// Next step after an attempt that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// New commit cycle once the gate opens.
    Fix,
    /// Poll the same commit again after a backoff.
    Repoll,
}

pub type FailureHook = Box<dyn Fn(u32, &RunFailure) + Send + Sync>;

pub struct Orchestrator {
    vcs: Arc<dyn Vcs>,
    poller: Poller,
    gate: Box<dyn FixGate>,
    policy: RetryPolicy,
    branch: String,
    report: ReportTarget,
    on_failure: Option<FailureHook>,
    state: RetryState,
}

impl Orchestrator {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        poller: Poller,
        gate: Box<dyn FixGate>,
        policy: RetryPolicy,
        report: ReportTarget,
    ) -> Self {
        let branch = poller.settings().branch.clone();
        Self {
            vcs,
            poller,
            gate,
            policy,
            branch,
            report,
            on_failure: None,
            state: RetryState::default(),
        }
    }

    /// Called with every failed run before the loop waits for a fix.
    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Runs attempts until a run succeeds or the attempt budget is spent.
    ///
    /// `message` is used for the first commit; later commits are
    /// "fix attempt N".
    ///
    /// # Errors
    ///
    /// Only version-control failures end the loop early. Provider errors and
    /// poll timeouts use up an attempt and the same commit is polled again.
    /// A gate that fails is logged and the next attempt starts right away.
    pub async fn run(&mut self, message: &str) -> Result<LoopOutcome> {
        let mut next = Next::Fix;

        while self.state.attempt < self.policy.max_attempts {
            self.state.attempt += 1;
            let attempt = self.state.attempt;
            info!("Attempt {attempt}/{}", self.policy.max_attempts);

            if next == Next::Fix {
                self.commit_and_push(attempt, message).await?;
            }

            let commit = self.vcs.current_commit_ref().await?;
            self.state.last_commit = Some(commit.clone());

            let outcome = match self.poller.wait_for(&commit).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Attempt {attempt}: {e}");
                    next = Next::Repoll;
                    if self.has_attempts_left() {
                        let delay = calculate_backoff(
                            attempt,
                            self.policy.backoff,
                            self.policy.max_backoff,
                        );
                        info!("Polling {} again in {}s", commit.short(), delay.as_secs());
                        sleep(delay).await;
                    }
                    continue;
                }
            };

            match outcome {
                PollOutcome::Success(success) => {
                    info!("Run #{} succeeded: {}", success.run.id, success.run.html_url);
                    return Ok(LoopOutcome::Succeeded {
                        run: success.run,
                        commit,
                        attempts: attempt,
                    });
                }
                PollOutcome::Failure(failure) => {
                    warn!(
                        "Run #{} concluded {}: {}",
                        failure.run.id,
                        failure.conclusion.as_str(),
                        failure.run.html_url
                    );
                    self.persist_report(&failure);
                    if let Some(hook) = &self.on_failure {
                        hook(attempt, &failure);
                    }
                    self.state.last_report = failure.report;

                    next = Next::Fix;
                    if self.has_attempts_left() {
                        if let Err(e) = self.gate.wait_for_fix(attempt).await {
                            warn!("Not waiting for a fix after attempt {attempt}: {e}");
                        }
                    }
                }
            }
        }

        warn!("Giving up after {} attempts", self.state.attempt);
        Ok(LoopOutcome::Exhausted {
            attempts: self.state.attempt,
            last_report: self.state.last_report.clone(),
        })
    }

    fn has_attempts_left(&self) -> bool {
        self.state.attempt < self.policy.max_attempts
    }

    async fn commit_and_push(&self, attempt: u32, message: &str) -> Result<()> {
        if !self.vcs.has_uncommitted_changes().await? {
            info!("No local changes to commit");
            return Ok(());
        }

        let message = if attempt == 1 {
            message.to_string()
        } else {
            format!("fix attempt {attempt}")
        };

        self.vcs.commit(&message).await?;
        info!("Committed: {message}");
        self.vcs.push(&self.branch).await?;
        info!("Pushed to '{}'", self.branch);
        Ok(())
    }

    fn persist_report(&self, failure: &RunFailure) {
        if let Err(e) = failure.persist(&self.report.path, self.report.format) {
            warn!(
                "Could not write error report to {}: {e}",
                self.report.path.display()
            );
        }
    }
}
