//! JSON and Markdown report generation.
//!
//! The JSON form keeps the `years / classes / yearsList / classesList`
//! layout and adds the run metadata and the per-class failures.

use crate::error::DetailError;
use crate::models::{ClassName, ReportMetadata, RunOutcome, YearView};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    #[serde(flatten)]
    metadata: &'a ReportMetadata,
    #[serde(flatten)]
    report: &'a crate::models::ClassReport,
    failures: Vec<FailureEntry<'a>>,
}

#[derive(Serialize)]
struct FailureEntry<'a> {
    class: &'a ClassName,
    kind: &'static str,
    message: String,
}

impl<'a> From<&'a DetailError> for FailureEntry<'a> {
    fn from(e: &'a DetailError) -> Self {
        Self {
            class: e.class(),
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Generate a pretty-printed JSON report.
pub fn generate_json_report(outcome: &RunOutcome, metadata: &ReportMetadata) -> Result<String> {
    let json = JsonReport {
        metadata,
        report: &outcome.report,
        failures: outcome.failures.iter().map(FailureEntry::from).collect(),
    };
    serde_json::to_string_pretty(&json).context("Failed to serialize report")
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(outcome: &RunOutcome, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Rollcall Report\n\n");
    output.push_str(&generate_metadata_section(outcome, metadata));
    output.push_str(&generate_years_section(outcome));
    output.push_str(&generate_failures_section(&outcome.failures));

    output
}

/// Generate the metadata section.
fn generate_metadata_section(outcome: &RunOutcome, metadata: &ReportMetadata) -> String {
    let mut section = String::new();
    let report = &outcome.report;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source_url));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Concurrency:** {}\n", metadata.concurrency));
    section.push_str(&format!("- **Years:** {}\n", report.year_count()));
    section.push_str(&format!("- **Classes:** {}\n", report.len()));
    section.push_str(&format!("- **Counted:** {}\n", report.counted()));
    if outcome.is_partial() {
        section.push_str(&format!("- **Failed:** {}\n", outcome.failures.len()));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate one table per year.
fn generate_years_section(outcome: &RunOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Years\n\n");

    if outcome.report.is_empty() {
        section.push_str("The roll service listed no classes.\n\n");
        return section;
    }

    for year in outcome.report.years() {
        section.push_str(&generate_year_table(&year));
    }

    section
}

fn generate_year_table(year: &YearView<'_>) -> String {
    let mut table = String::new();

    table.push_str(&format!(
        "### Year {} ({} students)\n\n",
        year.name(),
        year.total()
    ));
    table.push_str("| Class | Students |\n");
    table.push_str("|:---|---:|\n");
    for class in year.members() {
        let count = class
            .count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.push_str(&format!("| {} | {} |\n", class.name, count));
    }
    table.push('\n');

    table
}

/// Generate the failures section.
fn generate_failures_section(failures: &[DetailError]) -> String {
    let mut section = String::new();

    section.push_str("## Failures\n\n");
    if failures.is_empty() {
        section.push_str("All class sizes were fetched.\n");
        return section;
    }

    for failure in failures {
        section.push_str(&format!(
            "- `{}` ({}): {}\n",
            failure.class(),
            failure.kind(),
            failure
        ));
    }

    section
}

/// Write the report to `path`, or to stdout when no path is given.
pub fn write_report(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassReport;
    use chrono::Utc;
    use serde_json::Value;

    fn class(name: &str) -> ClassName {
        ClassName::parse(name).unwrap()
    }

    fn create_test_outcome() -> RunOutcome {
        let mut report = ClassReport::new();
        for name in ["03X", "03Y", "01A"] {
            report.insert_class(class(name)).unwrap();
        }
        report.set_count("03X", 27);
        report.set_count("01A", 32);

        RunOutcome {
            report,
            failures: vec![DetailError::UpstreamStatus {
                class: class("03Y"),
                status: 500,
            }],
        }
    }

    fn create_test_metadata() -> ReportMetadata {
        ReportMetadata {
            source_url: "http://localhost:3000".to_string(),
            generated_at: Utc::now(),
            concurrency: 3,
            duration_seconds: 0.4,
        }
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_outcome(), &create_test_metadata()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["sourceUrl"], "http://localhost:3000");
        assert_eq!(value["concurrency"], 3);
        assert!(value["generatedAt"].is_string());
        assert_eq!(value["yearsList"], serde_json::json!(["03", "01"]));
        assert_eq!(value["classesList"], serde_json::json!(["03X", "03Y", "01A"]));
        assert_eq!(value["classes"]["03X"]["count"], 27);
        assert!(value["classes"]["03Y"].get("count").is_none());
        assert_eq!(value["years"]["03"]["classes"]["03X"]["count"], 27);
        assert_eq!(value["failures"][0]["class"], "03Y");
        assert_eq!(value["failures"][0]["kind"], "upstream_status");
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let json = generate_json_report(&create_test_outcome(), &create_test_metadata()).unwrap();
        let x = json.find("\"03X\": {").unwrap();
        let a = json.find("\"01A\": {").unwrap();
        assert!(x < a);
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown =
            generate_markdown_report(&create_test_outcome(), &create_test_metadata());

        assert!(markdown.contains("# Rollcall Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Failed:** 1"));
        assert!(markdown.contains("### Year 03 (27 students)"));
        assert!(markdown.contains("| 03Y | - |"));
        assert!(markdown.contains("| 01A | 32 |"));
        assert!(markdown.contains("`03Y` (upstream_status)"));
    }

    #[test]
    fn test_markdown_empty_report() {
        let outcome = RunOutcome {
            report: ClassReport::new(),
            failures: Vec::new(),
        };
        let markdown = generate_markdown_report(&outcome, &create_test_metadata());

        assert!(markdown.contains("listed no classes"));
        assert!(markdown.contains("All class sizes were fetched."));
        assert!(!markdown.contains("**Failed:**"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll.json");

        write_report("{}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
