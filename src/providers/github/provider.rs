use async_trait::async_trait;

use crate::error::Result;
use crate::providers::{CiProvider, LogPayload, RunFilter};

use super::client::GitHubClient;
use super::types::{JobRecord, Workflow, WorkflowRun};

#[async_trait]
impl CiProvider for GitHubClient {
    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        GitHubClient::list_workflows(self).await
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>> {
        GitHubClient::list_runs(
            self,
            filter.branch.as_deref(),
            filter.workflow_id,
            filter.per_page,
        )
        .await
    }

    async fn get_run(&self, run_id: u64) -> Result<WorkflowRun> {
        GitHubClient::get_run(self, run_id).await
    }

    async fn list_jobs(&self, run_id: u64) -> Result<Vec<JobRecord>> {
        GitHubClient::list_jobs(self, run_id).await
    }

    async fn fetch_job_log(&self, job_id: u64) -> Result<LogPayload> {
        let bytes = self.job_log_bytes(job_id).await?;
        Ok(LogPayload::from_bytes(bytes))
    }
}
