//! Declarative rule table for classifying build-log lines.
//!
//! Each rule is data: a primary pattern that finds candidate messages, an
//! optional exclusion, and a list of locator patterns that pull `file`,
//! `line` and `col` out of the candidate. Adding a rule means adding a row
//! to [`RULES`], nothing else.

use std::collections::HashSet;
use std::fmt;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of message characters that participate in de-duplication.
pub const DEDUP_PREFIX_CHARS: usize = 100;

/// GitHub Actions prefixes every log line with an ISO-8601 timestamp.
const TIMESTAMP_PREFIX: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z\s+";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    CompilerError,
    BuildSystemError,
    BuildSystemWarning,
    LinkerError,
    ToolchainError,
    FatalError,
    UndefinedSymbol,
    MissingFile,
    SyntaxError,
}

impl FindingKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::CompilerError => "compiler error",
            Self::BuildSystemError => "build-system error",
            Self::BuildSystemWarning => "build-system warning",
            Self::LinkerError => "linker error",
            Self::ToolchainError => "platform-toolchain error",
            Self::FatalError => "fatal error",
            Self::UndefinedSymbol => "undefined symbol",
            Self::MissingFile => "missing file",
            Self::SyntaxError => "syntax error",
        }
    }

    /// Advisory fix hint shown next to each group in the text report.
    pub fn hint(self) -> &'static str {
        match self {
            Self::CompilerError | Self::ToolchainError => {
                "fix the reported source location; declarations and includes are the usual suspects"
            }
            Self::BuildSystemError => "check the CMake configuration at the reported line",
            Self::BuildSystemWarning => "review the CMake warning; it may turn into an error",
            Self::LinkerError | Self::UndefinedSymbol => {
                "check linked libraries and that every referenced symbol has a definition"
            }
            Self::FatalError => "the compiler stopped here; resolve this before anything else",
            Self::MissingFile => "add the missing header or file, or fix the include path",
            Self::SyntaxError => "check brackets, semicolons and the token before the marker",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One classified error or warning extracted from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub symbol: Option<String>,
}

impl ErrorFinding {
    fn new(kind: FindingKind, severity: Severity, message: String) -> Self {
        Self {
            kind,
            severity,
            message,
            file: None,
            line: None,
            column: None,
            symbol: None,
        }
    }

    /// `(kind, first 100 characters of the message)`.
    pub fn dedup_key(&self) -> (FindingKind, String) {
        (
            self.kind,
            self.message.chars().take(DEDUP_PREFIX_CHARS).collect(),
        )
    }

    /// `file:line` (or just `file`) when a locator matched.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        Some(match self.line {
            Some(line) => format!("{file}:{line}"),
            None => file.to_string(),
        })
    }
}

struct RuleSpec {
    kind: FindingKind,
    severity: Severity,
    pattern: &'static str,
    exclude: Option<&'static str>,
    locators: &'static [&'static str],
}

const SOURCE_LOCATORS: &[&str] = &[
    r"(?P<file>(?:[A-Za-z]:)?[^\s:()]+\.[A-Za-z0-9+]+):(?P<line>\d+):(?P<col>\d+):",
    r"(?P<file>(?:[A-Za-z]:)?[^\s:()]+\.[A-Za-z0-9+]+):(?P<line>\d+):",
];

const CMAKE_LOCATORS: &[&str] =
    &[r"(?P<file>(?:[^\s:()]*/)?CMakeLists\.txt|[^\s:()]+\.cmake):(?P<line>\d+)"];

const RULES: &[RuleSpec] = &[
    RuleSpec {
        kind: FindingKind::CompilerError,
        severity: Severity::Error,
        pattern: r"(?im)^.*\berror:.*$",
        exclude: Some(r"(?i)\bfatal error:|\bcmake error"),
        locators: SOURCE_LOCATORS,
    },
    RuleSpec {
        kind: FindingKind::BuildSystemError,
        severity: Severity::Error,
        pattern: r"(?im)^.*\bCMake Error\b.*$",
        exclude: None,
        locators: CMAKE_LOCATORS,
    },
    RuleSpec {
        kind: FindingKind::BuildSystemWarning,
        severity: Severity::Warning,
        pattern: r"(?im)^.*\bCMake (?:Deprecation )?Warning\b.*$",
        exclude: None,
        locators: CMAKE_LOCATORS,
    },
    RuleSpec {
        kind: FindingKind::LinkerError,
        severity: Severity::Error,
        pattern: r"(?im)^.*(?:undefined reference|undefined symbol|\bld(?:\.lld)?:.*\berror\b|\bLINK\s*:\s*(?:fatal\s+)?error|\bLNK\d{4}\b).*$",
        exclude: None,
        locators: &[r"(?P<file>(?:[A-Za-z]:)?[^\s:()]+\.(?:o|obj|a|lib|so|c|cc|cpp|cxx)):(?:(?P<line>\d+):)?"],
    },
    RuleSpec {
        kind: FindingKind::ToolchainError,
        severity: Severity::Error,
        pattern: r"(?im)^.*\b(?:fatal\s+)?error\s+C\d{4}\b.*$",
        exclude: None,
        locators: &[r"(?P<file>[^\s(]+)\((?P<line>\d+)(?:,(?P<col>\d+))?\)"],
    },
    RuleSpec {
        kind: FindingKind::FatalError,
        severity: Severity::Error,
        pattern: r"(?im)^.*\bfatal error:.*$",
        exclude: None,
        locators: SOURCE_LOCATORS,
    },
    RuleSpec {
        kind: FindingKind::UndefinedSymbol,
        severity: Severity::Error,
        pattern: r#"(?i)undefined (?:reference to|symbol:)\s*(?:[`'"‘](?P<symbol>[^`'"’\n]+)[`'"’]|(?P<bare_symbol>[^\s`'"’]+))"#,
        exclude: None,
        locators: &[],
    },
    RuleSpec {
        kind: FindingKind::MissingFile,
        severity: Severity::Error,
        pattern: r"(?im)^.*(?:cannot open|no such file|cannot find (?:file|include)).*$",
        exclude: None,
        locators: &[
            r#"(?i)(?P<file>[^\s:'"`]+)['"`]?:\s*No such file"#,
            r#"(?i)cannot open[^:\n]*:\s*['"`]?(?P<file>[^\s'"`]+?)['"`]?(?::|\s|$)"#,
        ],
    },
    RuleSpec {
        kind: FindingKind::SyntaxError,
        severity: Severity::Error,
        pattern: r"(?im)^.*\b(?:syntax\s*error|unexpected token|expected)\b[^:\n]*:.*$",
        exclude: None,
        locators: SOURCE_LOCATORS,
    },
];

/// A compiled row of the rule table.
pub struct Rule {
    pub kind: FindingKind,
    pub severity: Severity,
    pattern: Regex,
    exclude: Option<Regex>,
    locators: Vec<Regex>,
}

impl Rule {
    fn compile(def: &RuleSpec) -> Option<Self> {
        let compile = |pattern: &str| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping {} rule, invalid pattern: {e}", def.kind);
                None
            }
        };

        Some(Self {
            kind: def.kind,
            severity: def.severity,
            pattern: compile(def.pattern)?,
            exclude: match def.exclude {
                Some(pattern) => Some(compile(pattern)?),
                None => None,
            },
            locators: def
                .locators
                .iter()
                .map(|pattern| compile(*pattern))
                .collect::<Option<Vec<_>>>()?,
        })
    }

    /// Whether the primary pattern finds anything in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    fn is_excluded(&self, message: &str) -> bool {
        self.exclude.as_ref().is_some_and(|re| re.is_match(message))
    }

    /// Fills `file`, `line` and `column` from the first locator that matches.
    fn locate(&self, finding: &mut ErrorFinding) {
        let Some(caps) = self
            .locators
            .iter()
            .find_map(|re| re.captures(&finding.message))
        else {
            return;
        };

        finding.file = caps.name("file").map(|m| m.as_str().to_string());
        finding.line = caps.name("line").and_then(|m| m.as_str().parse().ok());
        finding.column = caps.name("col").and_then(|m| m.as_str().parse().ok());
    }
}

/// Applies the rule table to raw log text.
pub struct ErrorMatcher {
    rules: Vec<Rule>,
    timestamp: Option<Regex>,
}

impl Default for ErrorMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorMatcher {
    pub fn new() -> Self {
        Self {
            rules: RULES.iter().filter_map(Rule::compile).collect(),
            timestamp: Regex::new(TIMESTAMP_PREFIX).ok(),
        }
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether any rule's primary pattern matches this line.
    pub fn is_relevant_line(&self, line: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(line))
    }

    /// Finds every distinct finding in `text`, ordered by position in the log.
    ///
    /// Findings sharing a `(kind, 100-char message prefix)` key collapse to the
    /// first occurrence.
    pub fn find_all(&self, text: &str) -> Vec<ErrorFinding> {
        let mut seen = HashSet::new();
        let mut found: Vec<(usize, ErrorFinding)> = Vec::new();

        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };

                let message = self.normalize(whole.as_str());
                if message.is_empty() || rule.is_excluded(&message) {
                    continue;
                }

                let mut finding = ErrorFinding::new(rule.kind, rule.severity, message);
                if !seen.insert(finding.dedup_key()) {
                    continue;
                }

                rule.locate(&mut finding);
                finding.symbol = caps
                    .name("symbol")
                    .or_else(|| caps.name("bare_symbol"))
                    .map(|m| m.as_str().trim().to_string());

                found.push((whole.start(), finding));
            }
        }

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, finding)| finding).collect()
    }

    fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match &self.timestamp {
            Some(re) => re.replace(trimmed, "").trim().to_string(),
            None => trimmed.to_string(),
        }
    }
}
