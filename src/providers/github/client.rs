use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{CiFixError, Result};

use super::types::{JobRecord, JobsResponse, Workflow, WorkflowRun, WorkflowRunsResponse, WorkflowsResponse};

const USER_AGENT_VALUE: &str = concat!("cifix/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const ERROR_BODY_LIMIT: usize = 200;
/// Upper bound for a single request, including reading the body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// GitHub REST client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// API root, always ending in `/`
    api_url: Url,
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
    token: Option<Token>,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `repo_path` - Repository path in format "owner/repo"
    /// * `token` - Optional GitHub personal access token
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the repository path or base URL is
    /// malformed.
    pub fn new(base_url: &str, repo_path: &str, token: Option<Token>) -> Result<Self> {
        let (owner, repo) = parse_repo_path(repo_path)?;

        let mut root = base_url.trim().to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        let api_url = Url::parse(&root)
            .map_err(|e| CiFixError::Config(format!("Invalid GitHub API URL '{base_url}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_url,
            owner,
            repo,
            token,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let url = self.repo_url("actions/workflows")?;
        let response: WorkflowsResponse = self.get_json(url).await?;
        Ok(response.workflows)
    }

    /// Most recent runs first, optionally narrowed to a branch and workflow.
    pub async fn list_runs(
        &self,
        branch: Option<&str>,
        workflow_id: Option<u64>,
        per_page: u8,
    ) -> Result<Vec<WorkflowRun>> {
        let path = match workflow_id {
            Some(id) => format!("actions/workflows/{id}/runs"),
            None => "actions/runs".to_string(),
        };
        let mut url = self.repo_url(&path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(branch) = branch {
                query.append_pair("branch", branch);
            }
            query.append_pair("per_page", &per_page.max(1).to_string());
        }

        let response: WorkflowRunsResponse = self.get_json(url).await?;
        Ok(response.workflow_runs)
    }

    pub async fn get_run(&self, run_id: u64) -> Result<WorkflowRun> {
        let url = self.repo_url(&format!("actions/runs/{run_id}"))?;
        self.get_json(url).await
    }

    pub async fn list_jobs(&self, run_id: u64) -> Result<Vec<JobRecord>> {
        let mut url = self.repo_url(&format!("actions/runs/{run_id}/jobs"))?;
        url.query_pairs_mut().append_pair("per_page", "100");
        let response: JobsResponse = self.get_json(url).await?;
        Ok(response.jobs)
    }

    /// Raw bytes of a job's log, following GitHub's redirect to storage.
    pub async fn job_log_bytes(&self, job_id: u64) -> Result<Vec<u8>> {
        let url = self.repo_url(&format!("actions/jobs/{job_id}/logs"))?;
        debug!("GET {url}");

        let response = self.auth_request(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn repo_url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(&format!("repos/{}/{}/{}", self.owner, self.repo, path))
            .map_err(|e| CiFixError::Config(format!("Invalid API path '{path}': {e}")))
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(ACCEPT, GITHUB_JSON);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.as_str())),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {url}");
        let response = self.auth_request(self.client.get(url)).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn parse_repo_path(repo_path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = repo_path.trim().split('/').collect();
    match parts.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok(((*owner).to_string(), (*repo).to_string()))
        }
        _ => Err(CiFixError::Config(format!(
            "Repository must be in format 'owner/repo', got '{repo_path}'"
        ))),
    }
}

fn status_error(status: StatusCode, body: &str) -> CiFixError {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return CiFixError::Auth {
            status: status.as_u16(),
        };
    }

    let mut message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    if message.trim().is_empty() {
        message = status.canonical_reason().unwrap_or("unexpected status").to_string();
    }

    CiFixError::Api {
        status: status.as_u16(),
        message,
    }
}
