use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::{ReportFormat, ReportOptions};

/// Configuration file structure for CIFix.
///
/// Every field has a default, so a partial file (or none at all) is valid.
/// Command-line flags override what is loaded here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Repository identity and provider access
    #[serde(default)]
    pub github: GitHubConfig,

    /// Local working copy
    #[serde(default)]
    pub git: GitConfig,

    /// Poll cadence
    #[serde(default)]
    pub poll: PollConfig,

    /// Attempt budget and continuation mode
    #[serde(default)]
    pub retry: RetryConfig,

    /// Persisted error report
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// GitHub API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    /// Repository path (e.g., 'owner/repo')
    pub repo: Option<String>,

    /// Branch pushed to and polled
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Only follow runs of the workflow with this name
    pub workflow: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Working copy to commit from; the current directory when unset
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Download failed-job logs when a run fails
    #[serde(default = "default_true")]
    pub fetch_logs: bool,
}

/// How the retry loop waits for a fix between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationMode {
    /// Wait for Enter on stdin
    #[default]
    Manual,
    /// Sleep a fixed delay
    Auto,
    /// Wait for a signal file to appear
    Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub mode: ContinuationMode,

    #[serde(default = "default_auto_delay_secs")]
    pub auto_delay_secs: u64,

    /// First delay before re-polling after a timeout
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_signal_file")]
    pub signal_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub format: ReportFormat,

    #[serde(default = "default_true")]
    pub include_context: bool,

    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    #[serde(default = "default_max_context_lines")]
    pub max_context_lines: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_github_base_url(),
            repo: None,
            branch: default_branch(),
            workflow: None,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            workdir: None,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            fetch_logs: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            mode: ContinuationMode::default(),
            auto_delay_secs: default_auto_delay_secs(),
            backoff_secs: default_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            signal_file: default_signal_file(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            format: ReportFormat::default(),
            include_context: true,
            max_errors: default_max_errors(),
            max_context_lines: default_max_context_lines(),
        }
    }
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "dev".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_auto_delay_secs() -> u64 {
    10
}

fn default_backoff_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_signal_file() -> PathBuf {
    PathBuf::from(".cifix/continue")
}

fn default_report_path() -> PathBuf {
    PathBuf::from(".cifix/build-errors.txt")
}

fn default_max_errors() -> usize {
    50
}

fn default_max_context_lines() -> usize {
    10
}

const CANDIDATES: [&str; 4] = ["cifix.toml", "cifix.json", "cifix.yaml", "cifix.yml"];

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl RetryConfig {
    pub fn auto_delay(&self) -> Duration {
        Duration::from_secs(self.auto_delay_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl ReportConfig {
    pub fn options(&self) -> ReportOptions {
        ReportOptions {
            include_context: self.include_context,
            max_errors: self.max_errors,
            max_context_lines: self.max_context_lines,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cifix.toml
    /// 3. ./cifix.json
    /// 4. ./cifix.yaml
    /// 5. ./cifix.yml
    ///
    /// Returns default configuration if no file is found. A specified path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_in(Path::new("."), path)
    }

    fn load_in(dir: &Path, path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in &CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(repo) = &self.github.repo {
            let parts: Vec<&str> = repo.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
                bail!("Repository must be in format 'owner/repo', got '{repo}'");
            }
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max-attempts must be at least 1");
        }
        if self.poll.interval_secs == 0 {
            bail!("poll.interval-secs must be at least 1");
        }
        Ok(())
    }

    pub fn require_repo(&self) -> Result<&str> {
        self.github
            .repo
            .as_deref()
            .context("No repository configured; pass --repo owner/repo or set github.repo")
    }

    pub fn workdir(&self) -> PathBuf {
        self.git.workdir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
