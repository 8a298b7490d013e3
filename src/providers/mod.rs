//! CI provider seam.
//!
//! The poller only talks to [`CiProvider`]; [`GitHubClient`] is the one real
//! implementation.

pub mod github;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use log::{debug, warn};

use crate::error::Result;

pub use github::types::{Conclusion, FailedStep, JobRecord, RunState, Workflow, WorkflowRun};
pub use github::GitHubClient;

const DEFAULT_PER_PAGE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFilter {
    pub branch: Option<String>,
    pub workflow_id: Option<u64>,
    pub per_page: u8,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            branch: None,
            workflow_id: None,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl RunFilter {
    pub fn for_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..Self::default()
        }
    }

    pub fn with_workflow(mut self, workflow_id: Option<u64>) -> Self {
        self.workflow_id = workflow_id;
        self
    }
}

/// A job log as delivered by the provider.
///
/// Compressed archives and other binary blobs are reported as
/// `Undecodable` instead of being forced into a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    Text(String),
    Undecodable { bytes: usize, reason: &'static str },
}

impl LogPayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let size = bytes.len();

        if bytes.starts_with(b"PK\x03\x04") {
            return Self::Undecodable {
                bytes: size,
                reason: "zip archive",
            };
        }
        if bytes.starts_with(&[0x1f, 0x8b]) {
            return Self::Undecodable {
                bytes: size,
                reason: "gzip stream",
            };
        }
        if bytes.contains(&0) {
            return Self::Undecodable {
                bytes: size,
                reason: "binary data",
            };
        }

        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Undecodable {
                bytes: size,
                reason: "invalid UTF-8",
            },
        }
    }
}

#[async_trait]
pub trait CiProvider: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Runs matching `filter`, most recent first.
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>>;

    async fn get_run(&self, run_id: u64) -> Result<WorkflowRun>;

    async fn list_jobs(&self, run_id: u64) -> Result<Vec<JobRecord>>;

    async fn fetch_job_log(&self, job_id: u64) -> Result<LogPayload>;

    async fn latest_run(&self, filter: &RunFilter) -> Result<Option<WorkflowRun>> {
        let filter = RunFilter {
            per_page: 1,
            ..filter.clone()
        };
        Ok(self.list_runs(&filter).await?.into_iter().next())
    }
}

/// Resolves a workflow name to its id. Lookup failures fall back to `None`.
pub async fn find_workflow_id(provider: &dyn CiProvider, name: &str) -> Option<u64> {
    match provider.list_workflows().await {
        Ok(workflows) => {
            let found = workflows.iter().find(|w| w.name == name).map(|w| w.id);
            match found {
                Some(id) => debug!("Workflow '{name}' has id {id}"),
                None => warn!("Workflow '{name}' not found, polling every workflow on the branch"),
            }
            found
        }
        Err(e) => {
            warn!("Could not list workflows: {e}");
            None
        }
    }
}
