//! Text rendering of parse results for CLI output.

use crate::model::LabRecord;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// One row per record, in input order.
pub(crate) fn render_results(records: &[LabRecord]) -> Vec<String> {
    records.iter().map(render_row).collect()
}

fn render_row(r: &LabRecord) -> String {
    let mut row = format!("{}: {}", r.name, r.value);
    if !r.unit.trim().is_empty() {
        row.push(' ');
        row.push_str(r.unit.trim());
    }
    if !r.interpretation.trim().is_empty() {
        row.push_str(" — ");
        row.push_str(r.interpretation.trim());
    }
    row
}

pub(crate) fn build_text_summary(records: &[LabRecord], received_utc: &str) -> TextSummary {
    let mut lines = Vec::with_capacity(records.len() + 1);
    if records.is_empty() {
        lines.push(format!("No values recognized ({received_utc})"));
    } else {
        lines.push(format!(
            "Parsed {} value{} ({received_utc}):",
            records.len(),
            if records.len() == 1 { "" } else { "s" }
        ));
        lines.extend(render_results(records).into_iter().map(|r| format!("  {r}")));
    }
    TextSummary { lines }
}
