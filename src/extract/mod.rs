//! Build-log error extraction.
//!
//! [`rules`] classifies log lines into typed findings, [`report`] aggregates
//! them into an [`ErrorReport`], and [`format`] projects a report to text or
//! JSON.

pub mod format;
pub mod report;
pub mod rules;

pub use format::{write_notice, write_report, ReportFormat};
pub use report::{ErrorReport, ReportOptions};
pub use rules::Severity;
