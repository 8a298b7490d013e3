//! In-memory working copy for orchestrator tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CommitRef, Vcs};
use crate::error::{CiFixError, Result};

pub struct MockVcs {
    dirty: AtomicBool,
    head: Mutex<String>,
    commits: Mutex<Vec<String>>,
    pushes: Mutex<Vec<String>>,
    fail_push: bool,
}

impl MockVcs {
    pub fn new(head: &str, dirty: bool) -> Self {
        Self {
            dirty: AtomicBool::new(dirty),
            head: Mutex::new(head.to_string()),
            commits: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            fail_push: false,
        }
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Simulates someone editing files between attempts.
    pub fn touch(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Vcs for MockVcs {
    async fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.dirty.load(Ordering::SeqCst))
    }

    async fn commit(&self, message: &str) -> Result<()> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_string());
        *self.head.lock().unwrap() = format!("commit-{}", commits.len());
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        if self.fail_push {
            return Err(CiFixError::Vcs {
                command: format!("git push origin {branch}"),
                stderr: "rejected".to_string(),
            });
        }
        self.pushes.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn current_commit_ref(&self) -> Result<CommitRef> {
        Ok(CommitRef::from(self.head.lock().unwrap().as_str()))
    }
}
