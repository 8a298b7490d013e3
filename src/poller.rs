//! Tracks one commit through the CI run lifecycle.
//!
//! ```text
//! searching ──run for commit──> running ──completed──> success | failure
//!     └──────────── max wait elapsed ────────────> PollTimeout
//! ```

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::{sleep, timeout, Instant};

use crate::error::{CiFixError, Result};
use crate::extract::{write_notice, write_report, ErrorReport, ReportFormat, ReportOptions};
use crate::providers::{
    CiProvider, Conclusion, FailedStep, JobRecord, LogPayload, RunFilter, RunState, WorkflowRun,
};
use crate::vcs::CommitRef;

/// Recent runs inspected per tick when looking for the tracked commit.
const RUNS_PER_TICK: u8 = 10;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub branch: String,
    pub workflow_id: Option<u64>,
    pub interval: Duration,
    pub max_wait: Duration,
    /// Download failed-job logs and build an error report on failure.
    pub fetch_logs: bool,
    pub report: ReportOptions,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            branch: "dev".to_string(),
            workflow_id: None,
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            fetch_logs: true,
            report: ReportOptions::default(),
        }
    }
}

/// Externally visible poll state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Searching,
    Running,
    Success,
    Failure,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Searching => "searching",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        };
        f.write_str(label)
    }
}

/// What one provider query revealed about the tracked commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Searching,
    Running(WorkflowRun),
    Completed(WorkflowRun, Conclusion),
}

impl Tick {
    pub fn status(&self) -> PollStatus {
        match self {
            Self::Searching => PollStatus::Searching,
            Self::Running(_) => PollStatus::Running,
            Self::Completed(_, Conclusion::Success) => PollStatus::Success,
            Self::Completed(..) => PollStatus::Failure,
        }
    }

    pub fn run(&self) -> Option<&WorkflowRun> {
        match self {
            Self::Searching => None,
            Self::Running(run) | Self::Completed(run, _) => Some(run),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSuccess {
    pub run: WorkflowRun,
    pub jobs: Vec<JobRecord>,
}

#[derive(Debug, Clone)]
pub struct RunFailure {
    pub run: WorkflowRun,
    /// `Failure`, or `Cancelled`/`Unknown` kept apart for reporting.
    pub conclusion: Conclusion,
    pub jobs: Vec<JobRecord>,
    /// `None` when logs were disabled or could not be retrieved.
    pub report: Option<ErrorReport>,
}

impl RunFailure {
    pub fn failed_steps(&self) -> Vec<FailedStep> {
        self.jobs.iter().flat_map(JobRecord::failed_steps).collect()
    }

    /// Writes the report, or a notice naming the run when there is none.
    pub fn persist(&self, path: &Path, format: ReportFormat) -> Result<()> {
        match &self.report {
            Some(report) => write_report(report, path, format),
            None => {
                warn!("No error report available for run #{}", self.run.id);
                let notice = format!(
                    "No log text available for run #{} ({}): {}",
                    self.run.id,
                    self.conclusion.as_str(),
                    self.run.html_url
                );
                write_notice(&notice, path, format)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Success(RunSuccess),
    Failure(RunFailure),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

pub type StatusObserver = Box<dyn Fn(PollStatus, Option<&WorkflowRun>) + Send + Sync>;

pub struct Poller {
    provider: Arc<dyn CiProvider>,
    settings: PollSettings,
    observer: Option<StatusObserver>,
}

impl Poller {
    pub fn new(provider: Arc<dyn CiProvider>, settings: PollSettings) -> Self {
        Self {
            provider,
            settings,
            observer: None,
        }
    }

    /// Called once per status change.
    pub fn with_observer(mut self, observer: StatusObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    fn filter(&self) -> RunFilter {
        RunFilter {
            branch: Some(self.settings.branch.clone()),
            workflow_id: self.settings.workflow_id,
            per_page: RUNS_PER_TICK,
        }
    }

    /// One provider query. Runs for other commits are never mistaken for ours.
    pub async fn tick(&self, commit: &CommitRef) -> Result<Tick> {
        let runs = self.provider.list_runs(&self.filter()).await?;

        let Some(run) = runs.into_iter().find(|run| run.is_for(commit)) else {
            return Ok(Tick::Searching);
        };

        Ok(match run.state() {
            RunState::Queued | RunState::InProgress => Tick::Running(run),
            RunState::Completed(conclusion) => Tick::Completed(run, conclusion),
        })
    }

    /// Polls until the run for `commit` completes or the wait ceiling passes.
    ///
    /// # Errors
    ///
    /// `PollTimeout` when no terminal state is seen in time. Provider errors
    /// that are neither transient nor auth failures abort the poll.
    pub async fn wait_for(&self, commit: &CommitRef) -> Result<PollOutcome> {
        let started = Instant::now();
        let mut last_status = None;

        info!(
            "Waiting for workflow run of {} on '{}'",
            commit.short(),
            self.settings.branch
        );

        loop {
            let remaining = self.settings.max_wait.saturating_sub(started.elapsed());
            let Ok(result) = timeout(remaining, self.tick(commit)).await else {
                return Err(CiFixError::PollTimeout {
                    commit: commit.short().to_string(),
                    elapsed: started.elapsed(),
                });
            };

            match result {
                Ok(tick) => {
                    let status = tick.status();
                    if last_status != Some(status) {
                        self.announce(status, tick.run());
                        last_status = Some(status);
                    }

                    if let Tick::Completed(run, conclusion) = tick {
                        return Ok(self.finish(run, conclusion).await);
                    }
                }
                Err(e @ CiFixError::Auth { .. }) => warn!("{e}"),
                Err(e) if e.is_transient() => {
                    warn!("Poll for {} failed, retrying: {e}", commit.short());
                }
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if elapsed >= self.settings.max_wait {
                return Err(CiFixError::PollTimeout {
                    commit: commit.short().to_string(),
                    elapsed,
                });
            }

            sleep(self.settings.interval.min(self.settings.max_wait - elapsed)).await;
        }
    }

    fn announce(&self, status: PollStatus, run: Option<&WorkflowRun>) {
        match run {
            Some(run) => info!("Run #{} is {status} ({})", run.id, run.html_url),
            None => info!("No run for this commit yet"),
        }
        if let Some(observer) = &self.observer {
            observer(status, run);
        }
    }

    async fn finish(&self, run: WorkflowRun, conclusion: Conclusion) -> PollOutcome {
        let run = match self.provider.get_run(run.id).await {
            Ok(details) => details,
            Err(e) => {
                debug!("Keeping run snapshot, details unavailable: {e}");
                run
            }
        };

        let jobs = match self.provider.list_jobs(run.id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Could not list jobs for run #{}: {e}", run.id);
                Vec::new()
            }
        };

        if conclusion == Conclusion::Success {
            return PollOutcome::Success(RunSuccess { run, jobs });
        }

        let report = if self.settings.fetch_logs {
            self.collect_failure_report(&jobs).await
        } else {
            None
        };

        PollOutcome::Failure(RunFailure {
            run,
            conclusion,
            jobs,
            report,
        })
    }

    /// Builds an error report from the logs of the failed jobs.
    pub async fn collect_failure_report(&self, jobs: &[JobRecord]) -> Option<ErrorReport> {
        let failed: Vec<&JobRecord> = jobs.iter().filter(|job| job.failed()).collect();
        if failed.is_empty() {
            return None;
        }

        let logs = fetch_job_logs(self.provider.as_ref(), &failed).await;
        let combined = concat_job_logs(&failed, logs)?;

        Some(ErrorReport::build(&combined, &self.settings.report))
    }
}

/// Fetches logs for `jobs` concurrently; results keep the input order.
pub async fn fetch_job_logs(
    provider: &dyn CiProvider,
    jobs: &[&JobRecord],
) -> Vec<Result<LogPayload>> {
    join_all(jobs.iter().map(|job| provider.fetch_job_log(job.id))).await
}

/// Joins readable logs under per-job headers. `None` when nothing was readable.
pub fn concat_job_logs(jobs: &[&JobRecord], logs: Vec<Result<LogPayload>>) -> Option<String> {
    let mut combined = String::new();

    for (job, log) in jobs.iter().zip(logs) {
        match log {
            Ok(LogPayload::Text(text)) => {
                let _ = writeln!(combined, "=== Job: {} ===\n{text}", job.name);
            }
            Ok(LogPayload::Undecodable { bytes, reason }) => {
                warn!("Skipping log of job '{}': {reason} ({bytes} bytes)", job.name);
            }
            Err(e) => warn!("Could not fetch log of job '{}': {e}", job.name),
        }
    }

    if combined.is_empty() {
        None
    } else {
        Some(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::rules::FindingKind;
    use crate::providers::mock::{self, Scripted, ScriptedProvider};
    use crate::providers::github::types::RunStatus;
    use std::sync::Mutex;

    const OURS: &str = "1111111111111111111111111111111111111111";
    const THEIRS: &str = "2222222222222222222222222222222222222222";

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            ..PollSettings::default()
        }
    }

    fn done(id: u64, sha: &str, conclusion: Conclusion) -> WorkflowRun {
        mock::run(id, sha, RunStatus::Completed, Some(conclusion))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_lifecycle_ignoring_foreign_runs() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![done(1, THEIRS, Conclusion::Success)],
            vec![mock::run(2, OURS, RunStatus::Queued, None), done(1, THEIRS, Conclusion::Success)],
            vec![mock::run(2, OURS, RunStatus::InProgress, None)],
            vec![done(2, OURS, Conclusion::Success)],
        ]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let poller = Poller::new(provider.clone(), settings()).with_observer(Box::new(
            move |status: PollStatus, _: Option<&WorkflowRun>| {
                recorder.lock().unwrap().push(status);
            },
        ));

        let started = Instant::now();
        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        let PollOutcome::Success(success) = outcome else {
            panic!("expected success");
        };
        assert_eq!(success.run.id, 2);
        assert_eq!(provider.list_calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(started.elapsed() < Duration::from_secs(91));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PollStatus::Searching, PollStatus::Running, PollStatus::Success]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_outcome() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![mock::run(
            3,
            OURS,
            RunStatus::InProgress,
            None,
        )]]));
        let poller = Poller::new(
            provider.clone(),
            PollSettings {
                max_wait: Duration::from_secs(90),
                ..settings()
            },
        );

        let err = poller.wait_for(&CommitRef::from(OURS)).await.unwrap_err();

        match err {
            CiFixError::PollTimeout { commit, elapsed } => {
                assert_eq!(commit, "1111111");
                assert!(elapsed >= Duration::from_secs(90));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(provider.list_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_run_from_previous_push_never_completes_poll() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![done(
            9,
            THEIRS,
            Conclusion::Failure,
        )]]));
        let poller = Poller::new(
            provider,
            PollSettings {
                max_wait: Duration::from_secs(60),
                ..settings()
            },
        );

        let result = poller.wait_for(&CommitRef::from(OURS)).await;
        assert!(matches!(result, Err(CiFixError::PollTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::scripted(vec![
            Scripted::Fail(502),
            Scripted::Fail(401),
            Scripted::Runs(vec![done(4, OURS, Conclusion::Success)]),
        ]));
        let poller = Poller::new(provider.clone(), settings());

        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(provider.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_abort() {
        let provider = Arc::new(ScriptedProvider::scripted(vec![Scripted::Fail(404)]));
        let poller = Poller::new(provider.clone(), settings());

        let err = poller.wait_for(&CommitRef::from(OURS)).await.unwrap_err();

        assert!(matches!(err, CiFixError::Api { status: 404, .. }));
        assert_eq!(provider.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_tick_passes_branch_and_workflow() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let poller = Poller::new(
            provider.clone(),
            PollSettings {
                branch: "release".to_string(),
                workflow_id: Some(77),
                ..settings()
            },
        );

        assert_eq!(poller.tick(&CommitRef::from(OURS)).await.unwrap(), Tick::Searching);
        let filters = provider.filters.lock().unwrap();
        assert_eq!(filters[0].branch.as_deref(), Some("release"));
        assert_eq!(filters[0].workflow_id, Some(77));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_attaches_report_from_failed_jobs_only() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![vec![done(5, OURS, Conclusion::Failure)]])
                .with_jobs(vec![
                    mock::job(10, "lint", Conclusion::Success),
                    mock::job(11, "build-linux", Conclusion::Failure),
                    mock::job(12, "build-windows", Conclusion::Failure),
                ])
                .with_log(
                    11,
                    LogPayload::Text(
                        "2024-05-01T10:00:00.1234567Z src/foo.cpp:10:5: error: 'bar' was not declared in this scope\n"
                            .to_string(),
                    ),
                )
                .with_log(
                    12,
                    LogPayload::Undecodable {
                        bytes: 2048,
                        reason: "zip archive",
                    },
                ),
        );
        let poller = Poller::new(provider.clone(), settings());

        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        let PollOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.conclusion, Conclusion::Failure);
        assert_eq!(provider.log_calls(), 2);
        assert_eq!(failure.jobs.iter().filter(|job| job.failed()).count(), 2);
        assert_eq!(failure.failed_steps().len(), 2);

        let report = failure.report.expect("report");
        assert!(report.raw_log.starts_with("=== Job: build-linux ===\n"));
        assert!(!report.raw_log.contains("build-windows"));
        let compiler = report.group(FindingKind::CompilerError).unwrap();
        assert_eq!(compiler.findings[0].file.as_deref(), Some("src/foo.cpp"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_survives_detail_and_log_errors() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![vec![done(6, OURS, Conclusion::Failure)]])
                .with_jobs(vec![mock::job(13, "build", Conclusion::Failure)])
                .with_failing_details(),
        );
        let poller = Poller::new(provider, settings());

        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        let PollOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.run.id, 6);
        assert!(failure.report.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_survives_detail_errors() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![vec![done(8, OURS, Conclusion::Success)]])
                .with_jobs(vec![mock::job(15, "build", Conclusion::Success)])
                .with_failing_details(),
        );
        let poller = Poller::new(provider.clone(), settings());

        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        let PollOutcome::Success(success) = outcome else {
            panic!("expected success");
        };
        assert_eq!(success.run.id, 8);
        assert_eq!(success.run.head_sha, OURS);
        assert_eq!(success.jobs.len(), 1);
        assert_eq!(provider.log_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_still_times_out() {
        let provider = Arc::new(ScriptedProvider::scripted(vec![Scripted::Hang]));
        let poller = Poller::new(
            provider.clone(),
            PollSettings {
                max_wait: Duration::from_secs(120),
                ..settings()
            },
        );

        let started = Instant::now();
        let err = poller.wait_for(&CommitRef::from(OURS)).await.unwrap_err();

        assert!(matches!(err, CiFixError::PollTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(started.elapsed() < Duration::from_secs(121));
        assert_eq!(provider.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_is_failure_with_distinct_conclusion() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![vec![done(7, OURS, Conclusion::Cancelled)]])
                .with_jobs(vec![mock::job(14, "build", Conclusion::Failure)]),
        );
        let poller = Poller::new(
            provider.clone(),
            PollSettings {
                fetch_logs: false,
                ..settings()
            },
        );

        let outcome = poller.wait_for(&CommitRef::from(OURS)).await.unwrap();

        let PollOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.conclusion, Conclusion::Cancelled);
        assert!(failure.report.is_none());
        assert_eq!(provider.log_calls(), 0);
    }

    #[test]
    fn test_concat_keeps_job_order() {
        let first = mock::job(1, "first", Conclusion::Failure);
        let second = mock::job(2, "second", Conclusion::Failure);
        let combined = concat_job_logs(
            &[&first, &second],
            vec![
                Ok(LogPayload::Text("a".to_string())),
                Ok(LogPayload::Text("b".to_string())),
            ],
        )
        .unwrap();

        assert_eq!(combined, "=== Job: first ===\na\n=== Job: second ===\nb\n");
        assert!(concat_job_logs(&[&first], vec![Ok(LogPayload::Undecodable {
            bytes: 1,
            reason: "zip archive"
        })])
        .is_none());
    }
}
