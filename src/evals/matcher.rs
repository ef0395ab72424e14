//! Eval Matcher
//!
//! Correlates eval inputs with stored outputs purely by filename: an output belongs to an
//! input when its stem equals the input's base name, or is the base name followed by `_` and
//! any suffix. Every call rescans the directories; results are sorted so identical directory
//! contents always produce identical results.

use crate::error::EvalError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Accepted input image extensions
pub const INPUT_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
pub const OUTPUT_EXTENSION: &str = "html";

/// One input and its outputs in a single result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalCase {
    pub base_name: String,
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
}

/// One input matched in every compared set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparedCase {
    pub base_name: String,
    pub input: PathBuf,
    /// Matching outputs per set, in the order the sets were requested
    pub outputs: Vec<Vec<PathBuf>>,
}

impl ComparedCase {
    /// First output of each set, for side-by-side display
    pub fn primary_outputs(&self) -> Vec<&Path> {
        self.outputs
            .iter()
            .filter_map(|set| set.first().map(PathBuf::as_path))
            .collect()
    }
}

/// Input left out of a comparison because some sets had no output for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCase {
    pub base_name: String,
    pub missing_sets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub set_names: Vec<String>,
    pub cases: Vec<ComparedCase>,
    pub skipped: Vec<SkippedCase>,
}

/// Whether an output stem belongs to the input `base_name`
pub fn matches_base(stem: &str, base_name: &str) -> bool {
    match stem.strip_prefix(base_name) {
        Some("") => true,
        Some(rest) => rest.starts_with('_'),
        None => false,
    }
}

/// Display name of a result set: its last path segment
pub fn set_name(set: &Path) -> String {
    set.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| set.display().to_string())
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

// Regular files directly inside `dir` with an allowed extension, as (stem, path), sorted.
// Symlinks are followed and named by the link; dangling links are skipped.
fn scan(dir: &Path, allowed: &[&str]) -> Result<Vec<(String, PathBuf)>, EvalError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 && is_not_found(&e) => {
                debug!(path = ?e.path(), "Skipping dangling symlink");
                continue;
            }
            Err(e) => {
                return Err(EvalError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to scan {}: {}", dir.display(), e),
                )))
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), allowed) {
            continue;
        }
        let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        files.push((stem.to_string(), entry.path().to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Inputs as (base name, path), sorted by base name. When two inputs share a base name
/// (e.g. `login.png` and `login.jpg`) the first by path wins.
pub fn list_inputs(inputs_dir: &Path) -> Result<Vec<(String, PathBuf)>, EvalError> {
    if !inputs_dir.is_dir() {
        return Err(EvalError::InputsNotFound(inputs_dir.to_path_buf()));
    }
    let mut inputs = scan(inputs_dir, &INPUT_EXTENSIONS)?;
    inputs.dedup_by(|next, prev| next.0 == prev.0);
    Ok(inputs)
}

fn list_outputs(set: &Path) -> Result<Vec<(String, PathBuf)>, EvalError> {
    if !set.is_dir() {
        return Err(EvalError::SetNotFound(set.to_path_buf()));
    }
    scan(set, &[OUTPUT_EXTENSION])
}

fn outputs_for(base_name: &str, outputs: &[(String, PathBuf)]) -> Vec<PathBuf> {
    outputs
        .iter()
        .filter(|(stem, _)| matches_base(stem, base_name))
        .map(|(_, path)| path.clone())
        .collect()
}

/// Cases of one result set that have at least one output, ordered by base name
pub fn list_single(inputs_dir: &Path, set: &Path) -> Result<Vec<EvalCase>, EvalError> {
    let outputs = list_outputs(set)?;
    let cases = list_inputs(inputs_dir)?
        .into_iter()
        .filter_map(|(base_name, input)| {
            let matched = outputs_for(&base_name, &outputs);
            (!matched.is_empty()).then_some(EvalCase {
                base_name,
                input,
                outputs: matched,
            })
        })
        .collect();
    Ok(cases)
}

/// Compare two or more result sets.
///
/// A case appears only when every set has at least one output for it; every other input is
/// listed in `skipped` with the sets it is missing from.
pub fn compare_sets(inputs_dir: &Path, sets: &[PathBuf]) -> Result<Comparison, EvalError> {
    if sets.len() < 2 {
        return Err(EvalError::InsufficientSets { given: sets.len() });
    }
    let set_names: Vec<String> = sets.iter().map(|s| set_name(s)).collect();
    let set_outputs = sets
        .iter()
        .map(|set| list_outputs(set))
        .collect::<Result<Vec<_>, _>>()?;

    let mut cases = Vec::new();
    let mut skipped = Vec::new();
    for (base_name, input) in list_inputs(inputs_dir)? {
        let outputs: Vec<Vec<PathBuf>> = set_outputs
            .iter()
            .map(|outputs| outputs_for(&base_name, outputs))
            .collect();
        let missing_sets: Vec<String> = outputs
            .iter()
            .zip(&set_names)
            .filter(|(matched, _)| matched.is_empty())
            .map(|(_, name)| name.clone())
            .collect();
        if missing_sets.is_empty() {
            cases.push(ComparedCase {
                base_name,
                input,
                outputs,
            });
        } else {
            skipped.push(SkippedCase {
                base_name,
                missing_sets,
            });
        }
    }

    Ok(Comparison {
        set_names,
        cases,
        skipped,
    })
}
