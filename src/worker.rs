//! Variant Worker
//!
//! Drives one generation backend for one variant and reports progress as an ordered sequence
//! of `WorkerEvent`s: any number of `Status`/`Chunk` events followed by exactly one terminal
//! `Complete` or `Error`. Backend failures become an `Error` event; nothing escapes as a panic
//! or an unhandled `Err`.

use crate::prompts::ChatMessage;
use crate::provider::GenerationBackend;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static HTML_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<html.*?>.*</html>").expect("Invalid html document regex"));
static SVG_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg.*?>.*</svg>").expect("Invalid svg document regex"));
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n(.*?)\n?\s*```\s*$").expect("Invalid code fence regex")
});

/// Event produced by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Status(String),
    Chunk(String),
    /// Final artifact extracted from the accumulated output
    Complete(String),
    Error(String),
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Complete(_) | WorkerEvent::Error(_))
    }
}

/// Pull the generated document out of raw model output: drop a surrounding markdown fence
/// and keep only the `<html>`/`<svg>` span when one is present.
pub fn extract_artifact(raw: &str) -> String {
    let unfenced = CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    if let Some(m) = HTML_DOCUMENT.find(unfenced) {
        return m.as_str().to_string();
    }
    if let Some(m) = SVG_DOCUMENT.find(unfenced) {
        return m.as_str().to_string();
    }
    unfenced.trim().to_string()
}

pub struct VariantWorker {
    index: usize,
    backend: Arc<dyn GenerationBackend>,
    messages: Vec<ChatMessage>,
}

impl VariantWorker {
    pub fn new(index: usize, backend: Arc<dyn GenerationBackend>, messages: Vec<ChatMessage>) -> Self {
        Self {
            index,
            backend,
            messages,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Run the backend to completion, sending events in order. Returns early without a
    /// terminal event when `cancel` fires or the receiver goes away.
    pub async fn run(self, events: mpsc::UnboundedSender<WorkerEvent>, cancel: CancellationToken) {
        let index = self.index;
        let backend = self.backend.backend_name().to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(variant_index = index, backend = %backend, "Worker cancelled");
            }
            _ = self.drive(&events) => {}
        }
    }

    async fn drive(&self, events: &mpsc::UnboundedSender<WorkerEvent>) {
        let backend = self.backend.backend_name();
        let send = |event: WorkerEvent| events.send(event).is_ok();

        if !send(WorkerEvent::Status(format!("Waiting for {}...", backend))) {
            return;
        }

        let mut stream = match self.backend.stream(self.messages.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(variant_index = self.index, backend = %backend, kind = err.kind(), "Backend request failed");
                send(WorkerEvent::Error(err.to_string()));
                return;
            }
        };

        let mut buffer = String::new();
        let mut chunk_count = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    buffer.push_str(&delta);
                    chunk_count += 1;
                    if !send(WorkerEvent::Chunk(delta)) {
                        return;
                    }
                }
                Err(err) => {
                    warn!(variant_index = self.index, backend = %backend, kind = err.kind(), "Backend stream failed");
                    send(WorkerEvent::Error(err.to_string()));
                    return;
                }
            }
        }

        // Consumers key UI state off the first chunk
        if chunk_count == 0 && !send(WorkerEvent::Chunk(String::new())) {
            return;
        }

        debug!(
            variant_index = self.index,
            backend = %backend,
            chunk_count,
            bytes = buffer.len(),
            "Backend stream finished"
        );
        send(WorkerEvent::Complete(extract_artifact(&buffer)));
    }
}
