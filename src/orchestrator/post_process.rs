//! Post-parse processing utilities.
//!
//! Formats shown results for the active output mode and handles exports.

use crate::model::LabRecord;
use crate::text_summary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Result of post-parse processing, ready for presentation layers.
pub(crate) struct ProcessedResults {
    pub lines: Vec<String>,
    pub export_messages: Vec<String>,
}

#[derive(Serialize)]
struct ResultsExport<'a> {
    received_utc: &'a str,
    results: &'a [LabRecord],
}

/// Write the records as pretty JSON.
pub(crate) fn export_json(path: &Path, records: &[LabRecord], received_utc: &str) -> Result<()> {
    let doc = ResultsExport {
        received_utc,
        results: records,
    };
    let json = serde_json::to_string_pretty(&doc).context("serialize results")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Render shown results as text or JSON and run the requested export.
pub(crate) fn process_results(
    export_path: Option<&Path>,
    json_output: bool,
    records: &[LabRecord],
    received_utc: &str,
) -> ProcessedResults {
    let lines = if json_output {
        match serde_json::to_string_pretty(records) {
            Ok(s) => vec![s],
            Err(e) => vec![format!("JSON output failed: {e}")],
        }
    } else {
        text_summary::build_text_summary(records, received_utc).lines
    };

    let mut export_messages = Vec::new();
    if let Some(p) = export_path {
        match export_json(p, records, received_utc) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", p.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedResults {
        lines,
        export_messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordValue;

    fn records() -> Vec<LabRecord> {
        vec![LabRecord {
            name: "glucose".into(),
            value: RecordValue::Number(3.1),
            unit: "mmol/L".into(),
            interpretation: "low".into(),
        }]
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");
        let processed = process_results(Some(&path), false, &records(), "t0");

        assert_eq!(processed.lines.len(), 2);
        assert_eq!(
            processed.export_messages,
            vec![format!("Exported JSON: {}", path.display())]
        );
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["received_utc"], "t0");
        assert_eq!(v["results"][0]["name"], "glucose");
    }

    #[test]
    fn test_json_output_mode() {
        let processed = process_results(None, true, &records(), "t0");
        assert_eq!(processed.lines.len(), 1);
        let back: Vec<LabRecord> = serde_json::from_str(&processed.lines[0]).unwrap();
        assert_eq!(back, records());
        assert!(processed.export_messages.is_empty());
    }
}
