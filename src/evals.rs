//! Eval engine: matching stored outputs against their inputs, and batch generation of new
//! result sets.

pub mod matcher;
pub mod runner;

pub use matcher::{
    compare_sets, list_inputs, list_single, matches_base, set_name, ComparedCase, Comparison,
    EvalCase, SkippedCase,
};
pub use runner::{result_set_name, RunEvalsDriver, RunEvalsReport, RunFailure};

use crate::error::EvalError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Eval engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvalsConfig {
    /// Root holding `inputs/` and `results/`
    pub dir: PathBuf,
    /// Generations run at once by the run-evals driver
    pub concurrency: usize,
    /// Outputs generated per (case, backend)
    pub outputs_per_case: usize,
}

impl Default for EvalsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("evals_data"),
            concurrency: 4,
            outputs_per_case: 1,
        }
    }
}

impl EvalsConfig {
    pub fn inputs_dir(&self) -> PathBuf {
        self.dir.join("inputs")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.join("results")
    }
}

/// A case with its file contents loaded for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedEval {
    /// Input image as a data URL
    pub input: String,
    /// Output documents
    pub outputs: Vec<String>,
}

fn media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read an image file into a `data:` URL
pub async fn image_data_url(path: &Path) -> Result<String, EvalError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!(
        "data:{};base64,{}",
        media_type(path),
        STANDARD.encode(bytes)
    ))
}

async fn read_outputs<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> Result<Vec<String>, EvalError> {
    let mut outputs = Vec::new();
    for path in paths {
        outputs.push(tokio::fs::read_to_string(path).await?);
    }
    Ok(outputs)
}

/// Load a single-set case: the input plus every matching output
pub async fn load_case(case: &EvalCase) -> Result<LoadedEval, EvalError> {
    Ok(LoadedEval {
        input: image_data_url(&case.input).await?,
        outputs: read_outputs(case.outputs.iter().map(PathBuf::as_path)).await?,
    })
}

/// Load a compared case: the input plus the first output of each set, in set order
pub async fn load_compared(case: &ComparedCase) -> Result<LoadedEval, EvalError> {
    Ok(LoadedEval {
        input: image_data_url(&case.input).await?,
        outputs: read_outputs(case.primary_outputs()).await?,
    })
}
