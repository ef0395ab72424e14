//! Run-Evals Driver
//!
//! Generates a fresh result set per backend for every eval input. Each (case, backend) pair
//! is independent: a failure is recorded in the report and the pass continues.

use super::matcher::list_inputs;
use super::{image_data_url, EvalsConfig};
use crate::catalog::{BackendModel, Stack};
use crate::error::EvalError;
use crate::orchestrator::Orchestrator;
use crate::request::{Credentials, GenerationRequest};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub case: String,
    pub backend: BackendModel,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunEvalsReport {
    /// Written artifacts, sorted
    pub written: Vec<PathBuf>,
    /// Failed pairs, sorted by case then backend
    pub failures: Vec<RunFailure>,
}

/// Result-set directory name for a backend and stack
pub fn result_set_name(backend: BackendModel, stack: Stack) -> String {
    format!("{}_{}", backend.id(), stack.id())
}

struct Job {
    case: String,
    input: PathBuf,
    backend: BackendModel,
    /// Output ordinal; `None` when one output per case is configured
    ordinal: Option<usize>,
}

impl Job {
    fn file_name(&self) -> String {
        match self.ordinal {
            Some(n) => format!("{}_{}.html", self.case, n),
            None => format!("{}.html", self.case),
        }
    }
}

pub struct RunEvalsDriver {
    orchestrator: Arc<Orchestrator>,
    config: EvalsConfig,
    credentials: Credentials,
}

impl RunEvalsDriver {
    pub fn new(orchestrator: Arc<Orchestrator>, config: EvalsConfig, credentials: Credentials) -> Self {
        Self {
            orchestrator,
            config,
            credentials,
        }
    }

    /// Generate every input with every backend and write the results under
    /// `results/{backend}_{stack}/`.
    pub async fn run(
        &self,
        backends: &[BackendModel],
        stack: Stack,
    ) -> Result<RunEvalsReport, EvalError> {
        let inputs = list_inputs(&self.config.inputs_dir())?;
        let per_case = self.config.outputs_per_case.max(1);
        let started = Instant::now();

        let mut jobs = Vec::new();
        for backend in backends {
            for (case, input) in &inputs {
                for n in 0..per_case {
                    jobs.push(Job {
                        case: case.clone(),
                        input: input.clone(),
                        backend: *backend,
                        ordinal: (per_case > 1).then_some(n),
                    });
                }
            }
        }
        info!(
            cases = inputs.len(),
            backends = backends.len(),
            jobs = jobs.len(),
            stack = %stack,
            "Starting eval run"
        );

        let results_dir = self.config.results_dir();
        let results: Vec<(Job, Result<PathBuf, String>)> = stream::iter(jobs)
            .map(|job| {
                let orchestrator = self.orchestrator.clone();
                let credentials = self.credentials.clone();
                let results_dir = results_dir.clone();
                async move {
                    let outcome =
                        run_job(&orchestrator, credentials, &results_dir, &job, stack).await;
                    (job, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = RunEvalsReport::default();
        for (job, outcome) in results {
            match outcome {
                Ok(path) => report.written.push(path),
                Err(message) => {
                    warn!(case = %job.case, backend = %job.backend, error = %message, "Eval generation failed");
                    report.failures.push(RunFailure {
                        case: job.case,
                        backend: job.backend,
                        message,
                    });
                }
            }
        }
        report.written.sort();
        report.written.dedup();
        report
            .failures
            .sort_by(|a, b| (&a.case, a.backend.id()).cmp(&(&b.case, b.backend.id())));

        info!(
            written = report.written.len(),
            failed = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Eval run finished"
        );
        Ok(report)
    }
}

// One (case, backend, ordinal) generation; errors are flattened to their message
async fn run_job(
    orchestrator: &Orchestrator,
    credentials: Credentials,
    results_dir: &Path,
    job: &Job,
    stack: Stack,
) -> Result<PathBuf, String> {
    let data_url = image_data_url(&job.input)
        .await
        .map_err(|e| e.to_string())?;
    let request = GenerationRequest::create_from_image(stack, data_url, credentials, true)
        .with_backends(vec![job.backend]);

    let outcomes = orchestrator
        .generate_all(request)
        .await
        .map_err(|e| e.to_string())?;
    let artifact = outcomes
        .into_iter()
        .next()
        .ok_or_else(|| "No variant was started".to_string())?
        .result?;

    let dir = results_dir.join(result_set_name(job.backend, stack));
    write_artifact(&dir, &job.file_name(), &artifact)
        .await
        .map_err(|e| e.to_string())
}

async fn write_artifact(dir: &Path, file_name: &str, artifact: &str) -> Result<PathBuf, EvalError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, artifact).await?;
    Ok(path)
}
