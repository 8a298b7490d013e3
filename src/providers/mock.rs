//! Scripted in-memory provider for poller and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::github::types::{RunStatus, StepRecord};
use super::{CiProvider, Conclusion, JobRecord, LogPayload, RunFilter, Workflow, WorkflowRun};
use crate::error::{CiFixError, Result};

#[derive(Debug, Clone)]
pub enum Scripted {
    Runs(Vec<WorkflowRun>),
    Fail(u16),
    /// The request never completes.
    Hang,
}

/// Serves `list_runs` responses from a queue; the last one repeats forever.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Scripted>>,
    workflows: Vec<Workflow>,
    jobs: Vec<JobRecord>,
    logs: HashMap<u64, LogPayload>,
    fail_details: bool,
    list_calls: AtomicUsize,
    log_calls: AtomicUsize,
    pub filters: Mutex<Vec<RunFilter>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Vec<WorkflowRun>>) -> Self {
        Self::scripted(responses.into_iter().map(Scripted::Runs).collect())
    }

    pub fn scripted(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            workflows: Vec::new(),
            jobs: Vec::new(),
            logs: HashMap::new(),
            fail_details: false,
            list_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn with_workflows(mut self, workflows: Vec<Workflow>) -> Self {
        self.workflows = workflows;
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobRecord>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_log(mut self, job_id: u64, payload: LogPayload) -> Self {
        self.logs.insert(job_id, payload);
        self
    }

    pub fn with_failing_details(mut self) -> Self {
        self.fail_details = true;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Option<Scripted> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        }
    }

    fn known_run(&self, run_id: u64) -> Option<WorkflowRun> {
        let responses = self.responses.lock().unwrap();
        responses.iter().rev().find_map(|response| match response {
            Scripted::Runs(runs) => runs.iter().find(|r| r.id == run_id).cloned(),
            Scripted::Fail(_) | Scripted::Hang => None,
        })
    }
}

#[async_trait]
impl CiProvider for ScriptedProvider {
    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self.workflows.clone())
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(filter.clone());

        match self.next_response() {
            Some(Scripted::Runs(runs)) => Ok(runs),
            Some(Scripted::Fail(status @ (401 | 403))) => Err(CiFixError::Auth { status }),
            Some(Scripted::Fail(status)) => Err(CiFixError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_run(&self, run_id: u64) -> Result<WorkflowRun> {
        if self.fail_details {
            return Err(CiFixError::Api {
                status: 500,
                message: "details unavailable".to_string(),
            });
        }
        self.known_run(run_id).ok_or(CiFixError::Api {
            status: 404,
            message: "Not Found".to_string(),
        })
    }

    async fn list_jobs(&self, _run_id: u64) -> Result<Vec<JobRecord>> {
        Ok(self.jobs.clone())
    }

    async fn fetch_job_log(&self, job_id: u64) -> Result<LogPayload> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        self.logs.get(&job_id).cloned().ok_or(CiFixError::Api {
            status: 404,
            message: "log expired".to_string(),
        })
    }
}

pub fn run(id: u64, sha: &str, status: RunStatus, conclusion: Option<Conclusion>) -> WorkflowRun {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    WorkflowRun {
        id,
        name: Some("Build".to_string()),
        head_branch: Some("dev".to_string()),
        head_sha: sha.to_string(),
        status,
        conclusion,
        workflow_id: Some(1),
        run_number: Some(id),
        event: Some("push".to_string()),
        created_at: created,
        updated_at: created,
        html_url: format!("https://github.com/acme/app/actions/runs/{id}"),
    }
}

pub fn job(id: u64, name: &str, conclusion: Conclusion) -> JobRecord {
    JobRecord {
        id,
        run_id: None,
        name: name.to_string(),
        status: RunStatus::Completed,
        conclusion: Some(conclusion),
        started_at: None,
        completed_at: None,
        steps: vec![StepRecord {
            name: "Build".to_string(),
            status: RunStatus::Completed,
            conclusion: Some(conclusion),
            number: 1,
        }],
        html_url: None,
    }
}
