use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::{CommitRef, Vcs};
use crate::error::{CiFixError, Result};

/// Drives the `git` binary in a working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.into(),
        }
    }

    /// Runs `git <args>` and returns trimmed stdout.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        debug!("Executing {command}");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
            .map_err(|e| CiFixError::Vcs {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Err(CiFixError::Vcs {
                command,
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn has_uncommitted_changes(&self) -> Result<bool> {
        let status = self.git(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"]).await?;
        self.git(&["commit", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.git(&["push", &self.remote, branch]).await?;
        Ok(())
    }

    async fn current_commit_ref(&self) -> Result<CommitRef> {
        let head = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(CommitRef::from(head))
    }
}
