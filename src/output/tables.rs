use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::extract::Severity;
use crate::providers::{Conclusion, RunState};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn run_state_cell(state: RunState) -> Cell {
    match state {
        RunState::Queued => Cell::new("queued").fg(TableColor::Yellow),
        RunState::InProgress => Cell::new("in progress").fg(TableColor::Yellow),
        RunState::Completed(conclusion) => conclusion_cell(conclusion),
    }
}

pub fn conclusion_cell(conclusion: Conclusion) -> Cell {
    let color = match conclusion {
        Conclusion::Success => TableColor::Green,
        Conclusion::Failure => TableColor::Red,
        Conclusion::Cancelled | Conclusion::Unknown => TableColor::Yellow,
    };
    Cell::new(conclusion.as_str()).fg(color)
}

pub fn severity_count_cell(count: usize, severity: Severity) -> Cell {
    let text = count.to_string();
    match severity {
        Severity::Error => Cell::new(text).fg(TableColor::Red),
        Severity::Warning => Cell::new(text).fg(TableColor::Yellow),
    }
}
