//! Eval command presentation: single-set listing, comparison, run report.

use super::to_pretty_json;
use crate::evals::{Comparison, EvalCase, RunEvalsReport};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::{Path, PathBuf};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// First output by name, plus a count of the rest
fn outputs_cell(outputs: &[PathBuf]) -> String {
    match outputs {
        [] => "-".to_string(),
        [only] => file_name(only),
        [first, rest @ ..] => format!("{} (+{})", file_name(first), rest.len()),
    }
}

pub fn format_cases_text(set: &Path, cases: &[EvalCase]) -> String {
    if cases.is_empty() {
        return format!("No cases with outputs in {}", set.display());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Case", "Input", "Outputs"]);
    for case in cases {
        table.add_row(vec![
            case.base_name.clone(),
            file_name(&case.input),
            outputs_cell(&case.outputs),
        ]);
    }
    format!(
        "Result set: {}\n{}\n\nTotal: {} case(s)",
        set.display(),
        table,
        cases.len()
    )
}

pub fn format_cases_json(set: &Path, cases: &[EvalCase]) -> String {
    to_pretty_json(&json!({
        "set": set,
        "cases": cases,
        "total": cases.len(),
    }))
}

pub fn format_comparison_text(comparison: &Comparison) -> String {
    let mut output = String::new();
    if comparison.cases.is_empty() {
        output.push_str("No case has outputs in every set.\n");
    } else {
        let mut header = vec!["Case".to_string()];
        header.extend(comparison.set_names.iter().cloned());
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(header);
        for case in &comparison.cases {
            let mut row = vec![case.base_name.clone()];
            row.extend(case.outputs.iter().map(|outputs| outputs_cell(outputs)));
            table.add_row(row);
        }
        output.push_str(&table.to_string());
        output.push_str(&format!("\n\nCompared: {} case(s)\n", comparison.cases.len()));
    }

    if !comparison.skipped.is_empty() {
        output.push_str(&format!("\nSkipped: {} case(s)\n", comparison.skipped.len()));
        for skipped in &comparison.skipped {
            output.push_str(&format!(
                "  {:<24} missing in {}\n",
                skipped.base_name,
                skipped.missing_sets.join(", ")
            ));
        }
    }
    output
}

pub fn format_comparison_json(comparison: &Comparison) -> String {
    to_pretty_json(comparison)
}

pub fn format_run_report_text(report: &RunEvalsReport) -> String {
    let mut output = format!("Written: {} file(s)\n", report.written.len());
    for path in &report.written {
        output.push_str(&format!("  {}\n", path.display()));
    }
    if !report.failures.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Case", "Backend", "Error"]);
        for failure in &report.failures {
            table.add_row(vec![
                failure.case.clone(),
                failure.backend.to_string(),
                failure.message.clone(),
            ]);
        }
        output.push_str(&format!("\nFailed: {}\n", report.failures.len()));
        output.push_str(&table.to_string());
    }
    output
}

pub fn format_run_report_json(report: &RunEvalsReport) -> String {
    to_pretty_json(report)
}
