use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

use super::report::ErrorReport;
use crate::error::Result;

const RULE_WIDTH: usize = 60;
const FINDINGS_PER_GROUP: usize = 10;
const CONTEXT_LINES_SHOWN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

pub fn render(report: &ErrorReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(format_text(report)),
        ReportFormat::Json => format_json(report),
    }
}

pub fn format_json(report: &ErrorReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
pub fn parse_json(json: &str) -> Result<ErrorReport> {
    Ok(serde_json::from_str(json)?)
}

#[allow(clippy::format_push_string)]
pub fn format_text(report: &ErrorReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(RULE_WIDTH);
    let mut output = String::new();

    let _ = writeln!(output, "{rule}\nBuild error summary\n{rule}");
    let _ = writeln!(output, "Total errors:   {}", report.summary.total_errors);
    let _ = writeln!(output, "Total warnings: {}", report.summary.total_warnings);
    let _ = writeln!(output, "Error types:    {}\n", report.summary.error_types);

    if !report.groups.is_empty() {
        let _ = writeln!(output, "{rule}\nFindings by type\n{rule}");
    }

    for group in &report.groups {
        let _ = writeln!(
            output,
            "\n[{}] ({} found)\n{thin}",
            group.kind,
            group.findings.len()
        );
        for (index, finding) in group.findings.iter().take(FINDINGS_PER_GROUP).enumerate() {
            output.push_str(&format!("{}. ", index + 1));
            if let Some(location) = finding.location() {
                output.push_str(&format!("{location} - "));
            }
            output.push_str(&finding.message);
            if let Some(symbol) = &finding.symbol {
                output.push_str(&format!(" (symbol: {symbol})"));
            }
            output.push('\n');
        }
        if group.findings.len() > FINDINGS_PER_GROUP {
            let _ = writeln!(
                output,
                "... and {} more similar findings",
                group.findings.len() - FINDINGS_PER_GROUP
            );
        }
        let _ = writeln!(output, "hint: {}", group.kind.hint());
    }

    if !report.context.is_empty() {
        let _ = writeln!(output, "\n{rule}\nKey error context\n{rule}\n");
        for line in report.context.iter().take(CONTEXT_LINES_SHOWN) {
            let _ = writeln!(output, "{:>4} | {}", line.line_number, line.content);
        }
        if report.context.len() > CONTEXT_LINES_SHOWN {
            let _ = writeln!(
                output,
                "... {} more context lines",
                report.context.len() - CONTEXT_LINES_SHOWN
            );
        }
    }

    output
}

/// Writes the rendered report to `path`, replacing any previous report.
pub fn write_report(report: &ErrorReport, path: &Path, format: ReportFormat) -> Result<()> {
    replace_file(path, &render(report, format)?)?;
    info!("Error report written to: {}", path.display());

    Ok(())
}

/// Replaces the report at `path` with a note that no report could be built,
/// so a report from an earlier run is never left behind.
pub fn write_notice(notice: &str, path: &Path, format: ReportFormat) -> Result<()> {
    let contents = match format {
        ReportFormat::Text => format!("{notice}\n"),
        ReportFormat::Json => {
            serde_json::to_string_pretty(&serde_json::json!({ "notice": notice }))?
        }
    };
    replace_file(path, &contents)?;
    info!("Report notice written to: {}", path.display());

    Ok(())
}

fn replace_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}
