//! Version-control seam used by the retry loop.

pub mod git;
#[cfg(test)]
pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use git::GitCli;

/// Revision hash that correlates a push with its CI run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl From<&str> for CommitRef {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for CommitRef {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the retry loop needs from the working copy.
///
/// Any error is fatal to the current attempt.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Stages everything and records a commit.
    async fn commit(&self, message: &str) -> Result<()>;

    async fn push(&self, branch: &str) -> Result<()>;

    async fn current_commit_ref(&self) -> Result<CommitRef>;
}
