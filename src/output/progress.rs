use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, poll_status};
use crate::poller::{PollStatus, StatusObserver};
use crate::providers::WorkflowRun;
use crate::vcs::CommitRef;

/// Spinner that follows a poll through its status changes.
pub struct PollProgress {
    pb: ProgressBar,
}

impl PollProgress {
    pub fn start(commit: &CommitRef, branch: &str) -> Self {
        eprintln!(
            "{}  {}",
            bright("⏳"),
            bright(format!("Waiting for CI on '{branch}'")).underlined()
        );
        let pb = create_spinner(
            bright_yellow(format!("{}: looking for a workflow run", commit.short())).to_string(),
        );
        Self { pb }
    }

    /// Observer to hand to the poller; updates the spinner message.
    pub fn observer(&self) -> StatusObserver {
        let pb = self.pb.clone();
        Box::new(move |status: PollStatus, run: Option<&WorkflowRun>| {
            pb.set_message(status_message(status, run));
        })
    }

    pub fn finish(self, success: bool) {
        let message = if success {
            bright_green("CI passed ✓").to_string()
        } else {
            bright_red("CI did not pass ✗").to_string()
        };
        self.pb.finish_with_message(message);
    }

    pub fn abandon(self, reason: &str) {
        self.pb.abandon_with_message(bright_yellow(reason).to_string());
    }
}

fn status_message(status: PollStatus, run: Option<&WorkflowRun>) -> String {
    match run {
        Some(run) => format!(
            "Run {} {} ({})",
            cyan(format!("#{}", run.id)),
            poll_status(status),
            run.short_sha()
        ),
        None => format!("{} for a run of this commit", poll_status(status)),
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
