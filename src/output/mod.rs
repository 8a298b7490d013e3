mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PollProgress;
pub use styling::{bright_green, bright_red, bright_yellow, cyan, dim, magenta_bold};
pub use summary::{print_failure, print_jobs, print_report_summary, print_run, print_workflows};

/// Prints the `CIFix` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔧 CIFix"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Commit, push, watch CI, extract build errors")
    );
}
