use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vcs::CommitRef;

/// Raw lifecycle status as reported by GitHub Actions.
///
/// GitHub's pending-like statuses (`waiting`, `requested`, `pending`, ...)
/// all read as `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    #[serde(other)]
    Queued,
}

/// Terminal outcome of a completed run, job or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl Conclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

/// Status paired with its conclusion; only a completed run carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    Completed(Conclusion),
}

impl RunState {
    pub fn from_parts(status: RunStatus, conclusion: Option<Conclusion>) -> Self {
        match status {
            RunStatus::Queued => Self::Queued,
            RunStatus::InProgress => Self::InProgress,
            RunStatus::Completed => Self::Completed(conclusion.unwrap_or(Conclusion::Unknown)),
        }
    }

    pub fn conclusion(self) -> Option<Conclusion> {
        match self {
            Self::Completed(conclusion) => Some(conclusion),
            _ => None,
        }
    }
}

/// A GitHub Actions workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub state: String,
}

/// GitHub Actions workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Name of the workflow
    pub name: Option<String>,
    /// Head branch or tag name
    pub head_branch: Option<String>,
    /// SHA of the head commit
    pub head_sha: String,
    /// Status of the run
    pub status: RunStatus,
    /// Conclusion of the run; meaningful only once completed
    pub conclusion: Option<Conclusion>,
    /// Workflow this run belongs to
    #[serde(default)]
    pub workflow_id: Option<u64>,
    /// Run number
    #[serde(default)]
    pub run_number: Option<u64>,
    /// Event that triggered the run
    #[serde(default)]
    pub event: Option<String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    /// When the run was updated
    pub updated_at: DateTime<Utc>,
    /// Page for humans
    pub html_url: String,
}

impl WorkflowRun {
    pub fn state(&self) -> RunState {
        RunState::from_parts(self.status, self.conclusion)
    }

    pub fn is_for(&self, commit: &CommitRef) -> bool {
        self.head_sha == commit.as_str()
    }

    pub fn short_sha(&self) -> &str {
        self.head_sha.get(..7).unwrap_or(&self.head_sha)
    }
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    #[serde(default)]
    pub run_id: Option<u64>,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl JobRecord {
    pub fn state(&self) -> RunState {
        RunState::from_parts(self.status, self.conclusion)
    }

    pub fn failed(&self) -> bool {
        self.state() == RunState::Completed(Conclusion::Failure)
    }

    /// Wall time of a finished job.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = FailedStep> + '_ {
        self.steps
            .iter()
            .filter(|step| step.conclusion == Some(Conclusion::Failure))
            .map(|step| FailedStep {
                job_name: self.name.clone(),
                step_name: step.name.clone(),
                number: step.number,
            })
    }
}

/// Step within a GitHub Actions job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub job_name: String,
    pub step_name: String,
    pub number: u32,
}

#[derive(Deserialize)]
pub(super) struct WorkflowsResponse {
    pub workflows: Vec<Workflow>,
}

#[derive(Deserialize)]
pub(super) struct WorkflowRunsResponse {
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
pub(super) struct JobsResponse {
    pub jobs: Vec<JobRecord>,
}
