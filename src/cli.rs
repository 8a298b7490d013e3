use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::auth::Token;
use crate::config::{Config, ContinuationMode};
use crate::error::CiFixError;
use crate::extract::{write_report, ErrorReport, ReportFormat};
use crate::orchestrator::continuation::gate_for;
use crate::orchestrator::{LoopOutcome, Orchestrator, ReportTarget, RetryPolicy};
use crate::output::{
    bright_green, bright_red, bright_yellow, cyan, dim, print_failure, print_jobs,
    print_report_summary, print_run, print_workflows, PollProgress,
};
use crate::poller::{
    concat_job_logs, fetch_job_logs, PollOutcome, PollSettings, Poller, RunFailure,
};
use crate::providers::{
    find_workflow_id, CiProvider, Conclusion, GitHubClient, JobRecord, LogPayload, RunFilter,
    RunState,
};
use crate::vcs::{CommitRef, GitCli, Vcs};

/// Exit code for "not finished yet, check again later".
const EXIT_PENDING: u8 = 2;

#[derive(Parser)]
#[command(name = "cifix")]
#[command(
    author,
    version,
    about = "Commit, push, watch GitHub Actions and extract build errors until CI is green",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cifix.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository in 'owner/repo' form
    #[arg(short, long, global = true)]
    repo: Option<String>,

    /// Branch to push to and poll
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Only follow runs of this workflow (by name)
    #[arg(short, long, global = true)]
    workflow: Option<String>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit and push local changes, then poll and retry until CI passes
    Run {
        /// Message for the first commit
        #[arg(default_value = "Auto commit from cifix")]
        message: String,

        /// Retry automatically after a fixed delay instead of waiting for Enter
        #[arg(long, conflicts_with = "signal")]
        auto: bool,

        /// Wait for the signal file instead of waiting for Enter
        #[arg(long)]
        signal: bool,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: Option<u32>,
    },

    /// Poll for the run of the current (or given) commit without committing
    Wait {
        #[arg(long)]
        sha: Option<String>,
    },

    /// Show the latest run on the branch; exit 0 success, 1 failure, 2 pending
    Status,

    /// Download job logs of a run
    Logs {
        run_id: u64,

        /// Include logs of jobs that did not fail
        #[arg(long)]
        all: bool,

        #[arg(long, default_value = ".")]
        save_dir: PathBuf,
    },

    /// Build an error report from a saved log file
    Extract {
        file: PathBuf,

        /// Report destination (defaults to report.path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        #[arg(long)]
        no_context: bool,
    },

    /// List the repository's workflows
    Workflows,

    /// Write the effective configuration (without the token) to a file
    Init {
        #[arg(default_value = "cifix.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<ExitCode> {
        let config = self.load_config()?;

        match &self.command {
            Commands::Run {
                message,
                auto,
                signal,
                max_attempts,
            } => {
                let mut config = config;
                if *auto {
                    config.retry.mode = ContinuationMode::Auto;
                } else if *signal {
                    config.retry.mode = ContinuationMode::Signal;
                }
                if let Some(max_attempts) = max_attempts {
                    config.retry.max_attempts = *max_attempts;
                }
                self.execute_run(&config, message).await
            }
            Commands::Wait { sha } => self.execute_wait(&config, sha.as_deref()).await,
            Commands::Status => self.execute_status(&config).await,
            Commands::Logs {
                run_id,
                all,
                save_dir,
            } => self.execute_logs(&config, *run_id, *all, save_dir).await,
            Commands::Extract {
                file,
                output,
                format,
                no_context,
            } => Self::execute_extract(&config, file, output.as_deref(), *format, *no_context),
            Commands::Workflows => self.execute_workflows(&config).await,
            Commands::Init { path, force } => Self::execute_init(config, path, *force),
        }
    }

    /// File values first, command-line flags on top.
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(repo) = &self.repo {
            config.github.repo = Some(repo.clone());
        }
        if let Some(branch) = &self.branch {
            config.github.branch = branch.clone();
        }
        if let Some(workflow) = &self.workflow {
            config.github.workflow = Some(workflow.clone());
        }
        if let Some(token) = &self.token {
            config.github.token = Some(token.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn provider(&self, config: &Config) -> Result<Arc<GitHubClient>> {
        let repo = config.require_repo()?;
        let token = Token::from_optional(config.github.token.as_deref());
        let client = GitHubClient::new(&config.github.base_url, repo, token)
            .context("Failed to create GitHub client")?;

        if !client.is_authenticated() {
            warn!(
                "No GitHub token found (set GITHUB_TOKEN or github.token); \
                 requests are unauthenticated and heavily rate limited"
            );
        }
        debug!(
            "Using {}/{} at {}",
            client.owner(),
            client.repo(),
            config.github.base_url
        );

        Ok(Arc::new(client))
    }

    async fn poll_settings(config: &Config, provider: &dyn CiProvider) -> PollSettings {
        let workflow_id = match &config.github.workflow {
            Some(name) => find_workflow_id(provider, name).await,
            None => None,
        };

        PollSettings {
            branch: config.github.branch.clone(),
            workflow_id,
            interval: config.poll.interval(),
            max_wait: config.poll.max_wait(),
            fetch_logs: config.poll.fetch_logs,
            report: config.report.options(),
        }
    }

    async fn execute_run(&self, config: &Config, message: &str) -> Result<ExitCode> {
        let provider = self.provider(config)?;
        let settings = Self::poll_settings(config, provider.as_ref()).await;
        let vcs = Arc::new(GitCli::new(config.workdir(), config.git.remote.clone()));

        info!(
            "Retry loop on '{}' with up to {} attempts ({:?} continuation)",
            settings.branch, config.retry.max_attempts, config.retry.mode
        );

        let report_path = config.report.path.clone();
        let hook_path = report_path.clone();
        let policy = RetryPolicy {
            max_attempts: config.retry.max_attempts,
            backoff: config.retry.backoff(),
            max_backoff: config.retry.max_backoff(),
        };

        let mut orchestrator = Orchestrator::new(
            vcs,
            Poller::new(provider, settings),
            gate_for(&config.retry, &report_path),
            policy,
            ReportTarget {
                path: report_path,
                format: config.report.format,
            },
        )
        .with_failure_hook(Box::new(move |attempt: u32, failure: &RunFailure| {
            print_failure(attempt, failure, &hook_path);
        }));

        match orchestrator.run(message).await.context("Retry loop aborted")? {
            LoopOutcome::Succeeded {
                run,
                commit,
                attempts,
            } => {
                println!(
                    "{} {} {}",
                    bright_green("✓ CI passed"),
                    dim(format!("after {attempts} attempt(s) at")),
                    bright_yellow(commit.short())
                );
                print_run(&run);
                Ok(ExitCode::SUCCESS)
            }
            LoopOutcome::Exhausted {
                attempts,
                last_report,
            } => {
                let last_commit = orchestrator
                    .state()
                    .last_commit
                    .as_ref()
                    .map_or("-", CommitRef::short);
                let remaining = last_report.map_or(0, |report| report.summary.total_errors);
                eprintln!(
                    "{} {} {}",
                    bright_red(format!("✗ CI still failing after {attempts} attempt(s)")),
                    dim(format!("at {last_commit} with {remaining} error(s),")),
                    dim(format!("see {}", config.report.path.display()))
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }

    async fn execute_wait(&self, config: &Config, sha: Option<&str>) -> Result<ExitCode> {
        let commit = match sha {
            Some(sha) => CommitRef::from(sha),
            None => GitCli::new(config.workdir(), config.git.remote.clone())
                .current_commit_ref()
                .await
                .context("Failed to resolve HEAD")?,
        };

        let provider = self.provider(config)?;
        let settings = Self::poll_settings(config, provider.as_ref()).await;
        let progress = PollProgress::start(&commit, &settings.branch);
        let poller = Poller::new(provider, settings).with_observer(progress.observer());

        match poller.wait_for(&commit).await {
            Ok(outcome) => {
                progress.finish(outcome.is_success());
                match outcome {
                    PollOutcome::Success(success) => {
                        print_run(&success.run);
                        print_jobs(&success.jobs);
                        Ok(ExitCode::SUCCESS)
                    }
                    PollOutcome::Failure(failure) => {
                        failure.persist(&config.report.path, config.report.format)?;
                        print_failure(1, &failure, &config.report.path);
                        Ok(ExitCode::FAILURE)
                    }
                }
            }
            Err(e @ CiFixError::PollTimeout { .. }) => {
                progress.abandon("Timed out");
                warn!("{e}");
                Ok(ExitCode::from(EXIT_PENDING))
            }
            Err(e) => {
                progress.abandon("Poll failed");
                Err(e.into())
            }
        }
    }

    async fn execute_status(&self, config: &Config) -> Result<ExitCode> {
        let provider = self.provider(config)?;
        let workflow_id = match &config.github.workflow {
            Some(name) => find_workflow_id(provider.as_ref(), name).await,
            None => None,
        };
        let filter = RunFilter::for_branch(config.github.branch.as_str()).with_workflow(workflow_id);

        let Some(run) = provider
            .latest_run(&filter)
            .await
            .context("Failed to fetch the latest workflow run")?
        else {
            println!(
                "{}",
                bright_yellow(format!("No workflow runs on '{}'", config.github.branch))
            );
            return Ok(ExitCode::from(EXIT_PENDING));
        };

        print_run(&run);

        match run.state() {
            RunState::Completed(Conclusion::Success) => Ok(ExitCode::SUCCESS),
            RunState::Completed(_) => {
                match provider.list_jobs(run.id).await {
                    Ok(jobs) => print_jobs(&jobs),
                    Err(e) => warn!("Could not list jobs: {e}"),
                }
                Ok(ExitCode::FAILURE)
            }
            RunState::Queued | RunState::InProgress => Ok(ExitCode::from(EXIT_PENDING)),
        }
    }

    async fn execute_logs(
        &self,
        config: &Config,
        run_id: u64,
        all: bool,
        save_dir: &Path,
    ) -> Result<ExitCode> {
        let provider = self.provider(config)?;

        let run = provider
            .get_run(run_id)
            .await
            .with_context(|| format!("Failed to fetch run #{run_id}"))?;
        print_run(&run);

        let jobs = provider
            .list_jobs(run_id)
            .await
            .with_context(|| format!("Failed to list jobs of run #{run_id}"))?;
        print_jobs(&jobs);

        let selected: Vec<&JobRecord> = jobs.iter().filter(|job| all || job.failed()).collect();
        if selected.is_empty() {
            println!("{}", bright_green("No failed jobs in this run."));
            return Ok(ExitCode::SUCCESS);
        }

        std::fs::create_dir_all(save_dir)
            .with_context(|| format!("Failed to create {}", save_dir.display()))?;

        let logs = fetch_job_logs(provider.as_ref(), &selected).await;
        let mut readable_jobs = Vec::new();
        let mut readable_logs = Vec::new();

        for (job, log) in selected.iter().zip(logs) {
            match log {
                Ok(LogPayload::Text(text)) => {
                    let path = save_dir.join(format!("workflow-log-{run_id}-{}.txt", job.id));
                    std::fs::write(&path, &text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("  {} {}", dim(format!("{}:", job.name)), cyan(path.display()));
                    readable_jobs.push(*job);
                    readable_logs.push(Ok(LogPayload::Text(text)));
                }
                Ok(LogPayload::Undecodable { bytes, reason }) => {
                    warn!("Log of job '{}' is not plain text: {reason} ({bytes} bytes)", job.name);
                }
                Err(e) => warn!("Could not fetch log of job '{}': {e}", job.name),
            }
        }

        println!(
            "\n  {} {}/{}\n",
            dim("Logs saved:"),
            bright_yellow(readable_jobs.len()),
            selected.len()
        );

        if let Some(combined) = concat_job_logs(&readable_jobs, readable_logs) {
            print_report_summary(&ErrorReport::build(&combined, &config.report.options()));
        }

        Ok(ExitCode::SUCCESS)
    }

    fn execute_extract(
        config: &Config,
        file: &Path,
        output: Option<&Path>,
        format: Option<ReportFormat>,
        no_context: bool,
    ) -> Result<ExitCode> {
        let report = Self::extract_report(config, file, output, format, no_context)?;
        print_report_summary(&report);

        if report.summary.total_errors > 0 {
            Ok(ExitCode::FAILURE)
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }

    fn extract_report(
        config: &Config,
        file: &Path,
        output: Option<&Path>,
        format: Option<ReportFormat>,
        no_context: bool,
    ) -> Result<ErrorReport> {
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read log file: {}", file.display()))?;

        let mut options = config.report.options();
        if no_context {
            options.include_context = false;
        }

        let report = ErrorReport::from_bytes(&bytes, &options)
            .with_context(|| format!("Failed to analyse {}", file.display()))?;

        let output = output.unwrap_or(&config.report.path);
        write_report(&report, output, format.unwrap_or(config.report.format))?;
        Ok(report)
    }

    fn execute_init(mut config: Config, path: &Path, force: bool) -> Result<ExitCode> {
        if path.exists() && !force {
            bail!("{} already exists; pass --force to overwrite", path.display());
        }

        config.github.token = None;
        config.save(path)?;
        println!("{} {}", bright_green("✓ Wrote"), cyan(path.display()));
        Ok(ExitCode::SUCCESS)
    }

    async fn execute_workflows(&self, config: &Config) -> Result<ExitCode> {
        let provider = self.provider(config)?;
        let workflows = provider
            .list_workflows()
            .await
            .context("Failed to list workflows")?;
        print_workflows(&workflows);
        Ok(ExitCode::SUCCESS)
    }
}
