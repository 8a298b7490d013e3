use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::rules::{ErrorFinding, ErrorMatcher, FindingKind, Severity};
use crate::error::{CiFixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_context: bool,
    /// Cap on `ErrorReport::errors`; summary counts ignore it.
    pub max_errors: usize,
    /// Lines kept on each side of a matching line.
    pub max_context_lines: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_context: true,
            max_errors: 50,
            max_context_lines: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub error_types: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingGroup {
    pub kind: FindingKind,
    pub findings: Vec<ErrorFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    /// 1-based.
    pub line_number: usize,
    pub content: String,
}

/// Structured view of one failed build log.
///
/// Built once from the raw text and never mutated afterwards. `groups` holds
/// every finding; `errors` is the same sequence capped at `max_errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub summary: ReportSummary,
    pub errors: Vec<ErrorFinding>,
    pub groups: Vec<FindingGroup>,
    pub context: Vec<ContextLine>,
    pub raw_log: String,
}

impl ErrorReport {
    pub fn build(log: &str, options: &ReportOptions) -> Self {
        Self::build_with(&ErrorMatcher::new(), log, options)
    }

    pub fn build_with(matcher: &ErrorMatcher, log: &str, options: &ReportOptions) -> Self {
        let findings = matcher.find_all(log);

        let mut grouped: IndexMap<FindingKind, Vec<ErrorFinding>> = IndexMap::new();
        for finding in &findings {
            grouped.entry(finding.kind).or_default().push(finding.clone());
        }

        let summary = ReportSummary {
            total_errors: count_severity(&findings, Severity::Error),
            total_warnings: count_severity(&findings, Severity::Warning),
            error_types: grouped.len(),
        };

        let context = if options.include_context {
            extract_context(matcher, log, options.max_context_lines)
        } else {
            Vec::new()
        };

        let mut errors = findings;
        errors.truncate(options.max_errors);

        Self {
            summary,
            errors,
            groups: grouped
                .into_iter()
                .map(|(kind, findings)| FindingGroup { kind, findings })
                .collect(),
            context,
            raw_log: log.to_string(),
        }
    }

    /// Builds a report from raw bytes, rejecting input that is not text.
    pub fn from_bytes(bytes: &[u8], options: &ReportOptions) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            CiFixError::Extraction(format!("log is not UTF-8 text (invalid byte at {})", e.valid_up_to()))
        })?;

        if text.contains('\0') {
            return Err(CiFixError::Extraction(
                "log contains NUL bytes, probably a binary archive".to_string(),
            ));
        }

        Ok(Self::build(text, options))
    }

    pub fn is_clean(&self) -> bool {
        self.summary.total_errors == 0 && self.summary.total_warnings == 0
    }

    #[cfg(test)]
    pub fn group(&self, kind: FindingKind) -> Option<&FindingGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }
}

fn count_severity(findings: &[ErrorFinding], severity: Severity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}

fn extract_context(matcher: &ErrorMatcher, log: &str, window: usize) -> Vec<ContextLine> {
    let lines: Vec<&str> = log.lines().collect();
    let Some(last) = lines.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut relevant = BTreeSet::new();
    for (index, line) in lines.iter().enumerate() {
        if matcher.is_relevant_line(line) {
            let start = index.saturating_sub(window);
            let end = index.saturating_add(window).min(last);
            relevant.extend(start..=end);
        }
    }

    relevant
        .into_iter()
        .map(|index| ContextLine {
            line_number: index + 1,
            content: lines[index].to_string(),
        })
        .collect()
}
