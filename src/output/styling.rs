use console::style;

use crate::poller::PollStatus;
use crate::providers::{Conclusion, RunState};

/// Styling helpers for terminal output
pub fn bright_yellow(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn bright_green(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().red()
}

pub fn cyan(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Green for success, red for failure, yellow for everything still moving.
pub fn run_state(state: RunState) -> console::StyledObject<String> {
    match state {
        RunState::Queued => bright_yellow("queued"),
        RunState::InProgress => bright_yellow("in progress"),
        RunState::Completed(conclusion) => self::conclusion(conclusion),
    }
}

pub fn conclusion(conclusion: Conclusion) -> console::StyledObject<String> {
    match conclusion {
        Conclusion::Success => bright_green(conclusion.as_str()),
        Conclusion::Failure => bright_red(conclusion.as_str()),
        Conclusion::Cancelled | Conclusion::Unknown => bright_yellow(conclusion.as_str()),
    }
}

pub fn poll_status(status: PollStatus) -> console::StyledObject<String> {
    match status {
        PollStatus::Searching => dim(status),
        PollStatus::Running => bright_yellow(status),
        PollStatus::Success => bright_green(status),
        PollStatus::Failure => bright_red(status),
    }
}
