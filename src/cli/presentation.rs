//! CLI presentation: text and json formatters per command family.

mod catalog;
mod evals;

pub use catalog::{format_catalog_json, format_catalog_text};
pub use evals::{
    format_cases_json, format_cases_text, format_comparison_json, format_comparison_text,
    format_run_report_json, format_run_report_text,
};

use crate::error::ApiError;
use std::str::FromStr;

/// `--format` value for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ApiError::InvalidRequest(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }
}

pub(crate) fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
