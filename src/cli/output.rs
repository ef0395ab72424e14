//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::ApiError;

/// Map domain errors to a string for CLI output. Configuration problems are reported
/// one per line, so they keep their own formatting.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ConfigError(message) => message.clone(),
        other => other.to_string(),
    }
}
