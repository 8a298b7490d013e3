use std::fmt::Write;
use std::path::Path;

use comfy_table::{Cell, Color as TableColor};

use crate::extract::ErrorReport;
use crate::poller::RunFailure;
use crate::providers::{Conclusion, FailedStep, JobRecord, Workflow, WorkflowRun};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim, run_state};
use super::tables::{create_cyan_header, create_table, run_state_cell, severity_count_cell};

const FINDING_PREVIEW_CHARS: usize = 80;

/// Prints the headline of a workflow run to stdout.
pub fn print_run(run: &WorkflowRun) {
    println!("{}", render_run(run));
}

/// Prints the findings overview of an error report to stdout.
///
/// Shows the summary counts followed by one table row per finding type with
/// its first occurrence and a fix hint. The full report lives in the
/// persisted file; this is only the glance view.
pub fn print_report_summary(report: &ErrorReport) {
    println!("{}", render_report_summary(report));
}

/// Prints everything known about a failed run: headline, failed steps,
/// findings and where the full report was written.
pub fn print_failure(attempt: u32, failure: &RunFailure, report_path: &Path) {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} {}",
        bright_red("✗"),
        bright(format!("Attempt {attempt} failed ({})", failure.conclusion.as_str()))
    );
    output.push_str(&render_run(&failure.run));
    output.push_str(&render_failed_steps(&failure.failed_steps()));

    match &failure.report {
        Some(report) => {
            output.push_str(&render_report_summary(report));
            let _ = writeln!(
                output,
                "  {} {}",
                dim("Full report:"),
                cyan(report_path.display())
            );
        }
        None => {
            let _ = writeln!(output, "  {}", bright_yellow("No build log could be analysed."));
        }
    }

    println!("{output}");
}

pub fn print_jobs(jobs: &[JobRecord]) {
    println!("{}", render_jobs(jobs));
}

pub fn print_workflows(workflows: &[Workflow]) {
    println!("{}", render_workflows(workflows));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn preview(text: &str) -> String {
    if text.chars().count() <= FINDING_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(FINDING_PREVIEW_CHARS).collect();
    format!("{cut}…")
}

fn render_run(run: &WorkflowRun) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🚦", "Workflow Run");

    let number = run
        .run_number
        .map_or_else(String::new, |number| format!(" (run {number})"));
    let trigger = match (&run.head_branch, &run.event) {
        (Some(branch), Some(event)) => format!("{branch} via {event}"),
        (Some(branch), None) => branch.clone(),
        (None, Some(event)) => event.clone(),
        (None, None) => "unknown".to_string(),
    };

    let _ = writeln!(
        output,
        "  {} {}{}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {} {}\n  {} {}\n",
        dim("Run:"),
        cyan(format!("#{}", run.id)),
        dim(number),
        dim("Workflow:"),
        run.name.as_deref().unwrap_or("unknown"),
        dim("Branch:"),
        trigger,
        dim("Status:"),
        run_state(run.state()),
        dim("Commit:"),
        bright_yellow(run.short_sha()),
        dim("Created:"),
        dim(run.created_at.format("%Y-%m-%d %H:%M UTC")),
        dim(format!("(updated {})", run.updated_at.format("%H:%M"))),
        dim("URL:"),
        cyan(&run.html_url)
    );
    output
}

fn render_failed_steps(steps: &[FailedStep]) -> String {
    if steps.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    add_section_header(&mut output, "🧱", "Failed Steps");
    for step in steps {
        let _ = writeln!(
            output,
            "  {} {} {} {}. {}",
            bright_red("✗"),
            bright(&step.job_name),
            dim("→"),
            step.number,
            step.step_name
        );
    }
    output.push('\n');
    output
}

fn render_report_summary(report: &ErrorReport) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📊", "Build Errors");

    let errors = if report.summary.total_errors == 0 {
        bright_green(report.summary.total_errors)
    } else {
        bright_red(report.summary.total_errors)
    };
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Errors:"),
        errors,
        dim("Warnings:"),
        bright_yellow(report.summary.total_warnings),
        dim("Error types:"),
        bright_yellow(report.summary.error_types)
    );

    if report.is_clean() {
        let _ = writeln!(
            output,
            "{}",
            bright_yellow("No known error patterns found in the log.")
        );
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Type", "Count", "First Finding", "Hint"]));

    for group in &report.groups {
        let Some(first) = group.findings.first() else {
            continue;
        };
        let severity = first.severity;
        let location = first
            .location()
            .map_or_else(String::new, |location| format!("{location}\n"));

        table.add_row(vec![
            Cell::new(group.kind.label()),
            severity_count_cell(group.findings.len(), severity),
            Cell::new(format!("{location}{}", preview(&first.message))),
            Cell::new(group.kind.hint()).fg(TableColor::DarkGrey),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_jobs(jobs: &[JobRecord]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🧰", "Jobs");

    if jobs.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No jobs found for this run."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Job", "Result", "Duration", "Steps"]));

    for job in jobs {
        let steps = job
            .steps
            .iter()
            .map(|step| {
                let marker = match step.conclusion {
                    Some(Conclusion::Failure) => "✗",
                    Some(Conclusion::Success) => "✓",
                    _ => "·",
                };
                format!("{marker} {}. {}", step.number, step.name)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let duration = job.duration().map_or_else(
            || "-".to_string(),
            |d| format!("{}m {:02}s", d.num_minutes(), d.num_seconds() % 60),
        );

        table.add_row(vec![
            Cell::new(&job.name),
            run_state_cell(job.state()),
            Cell::new(duration),
            Cell::new(steps),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_workflows(workflows: &[Workflow]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🗂️", "Workflows");

    if workflows.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No workflows found."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Name", "ID", "State", "Path"]));
    for workflow in workflows {
        let state = if workflow.state == "active" {
            Cell::new(&workflow.state).fg(TableColor::Green)
        } else {
            Cell::new(&workflow.state).fg(TableColor::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&workflow.name),
            Cell::new(workflow.id),
            state,
            Cell::new(&workflow.path),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}
