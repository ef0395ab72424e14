//! Generation Orchestrator
//!
//! Selects backends for a request, runs one worker per variant concurrently, and multiplexes
//! their events into one outward stream. Each variant has a supervising task that owns its
//! state, applies the image pass after the worker completes, and is the only sender of that
//! variant's events, so per-variant order is preserved end to end.
//!
//! Dropping the outward [`GenerationStream`] cancels every in-flight worker.

use crate::catalog::{BackendFamily, BackendModel, GenerationType, InputMode};
use crate::error::{ApiError, ProviderError};
use crate::image_cache::ImageCache;
use crate::images::{find_placeholders, resolve_images, seed_cache_from_baseline};
use crate::prompts::{self, ChatMessage};
use crate::provider::{BackendFactory, GenerationBackend, ImageBackend};
use crate::request::GenerationRequest;
use crate::worker::{VariantWorker, WorkerEvent};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

pub const STATUS_GENERATING_CODE: &str = "Generating code...";
pub const STATUS_GENERATING_IMAGES: &str = "Generating images...";
pub const STATUS_COMPLETE: &str = "Generation complete.";

const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Pick the backends for a request.
///
/// With an explicit override, each backend still needs its family credential. Otherwise one
/// eligible family yields its two create entries (or its focused update entry), and two or
/// more families yield one entry from each of the first two in priority order.
pub fn select_backends(request: &GenerationRequest) -> Result<Vec<BackendModel>, ApiError> {
    let video = request.input_mode == InputMode::Video;

    if let Some(explicit) = &request.backends {
        for model in explicit {
            if !request.credentials.has(model.family()) {
                return Err(ApiError::NoCredentials(format!(
                    "{} ({})",
                    request.input_mode, model
                )));
            }
            if video && !model.supports_video() {
                return Err(ApiError::UnsupportedMode(format!(
                    "{} does not accept video input",
                    model
                )));
            }
        }
        return Ok(explicit.clone());
    }

    let families: Vec<_> = request
        .credentials
        .families()
        .into_iter()
        .filter(|family| !video || family.supports_video())
        .collect();

    let entry = |family: BackendFamily| match request.generation_type {
        GenerationType::Create => family.create_entries()[0],
        GenerationType::Update => family.update_entry(),
    };

    match families.as_slice() {
        [] => Err(ApiError::NoCredentials(request.input_mode.to_string())),
        [only] => Ok(match request.generation_type {
            GenerationType::Create => only.create_entries().to_vec(),
            GenerationType::Update => vec![only.update_entry()],
        }),
        [first, second, ..] => Ok(vec![entry(*first), entry(*second)]),
    }
}

/// Event leaving the orchestrator, tagged with its variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub variant_index: usize,
    pub event: WorkerEvent,
}

/// Lifecycle of one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl VariantStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VariantStatus::Completed | VariantStatus::Failed)
    }
}

/// Per-variant state, owned by its supervisor
#[derive(Debug)]
struct Variant {
    index: usize,
    backend: BackendModel,
    buffer: String,
    status: VariantStatus,
}

impl Variant {
    fn new(index: usize, backend: BackendModel) -> Self {
        Self {
            index,
            backend,
            buffer: String::new(),
            status: VariantStatus::Pending,
        }
    }

    fn record_chunk(&mut self, chunk: &str) {
        self.status = VariantStatus::Streaming;
        self.buffer.push_str(chunk);
    }

    fn finish(&mut self, status: VariantStatus) {
        debug_assert!(!self.status.is_terminal(), "variant finished twice");
        self.status = status;
        self.buffer.clear();
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Server-side switch; a request can only narrow it
    pub image_generation: bool,
    /// How long a cancelled worker may take to wind down before it is aborted
    pub cancel_grace: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            image_generation: true,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

/// Lazy, non-restartable sequence of tagged events for one request
pub struct GenerationStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    backends: Vec<BackendModel>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl GenerationStream {
    /// Backends in variant-index order
    pub fn backends(&self) -> &[BackendModel] {
        &self.backends
    }

    pub fn variant_count(&self) -> usize {
        self.backends.len()
    }

    /// Next event, or `None` once every variant is terminal or the stream was cancelled
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Stop every worker; no further events are produced for variants still in flight.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }
}

impl Stream for GenerationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.events.poll_recv(cx)
    }
}

/// Final outcome of one variant, for callers that do not stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantOutcome {
    pub variant_index: usize,
    pub backend: BackendModel,
    pub result: Result<String, String>,
}

pub struct Orchestrator {
    factory: Arc<dyn BackendFactory>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn BackendFactory>, settings: OrchestratorSettings) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Validate backend selection and start every variant.
    ///
    /// Fails before any worker starts when no backend is eligible.
    pub fn start(&self, request: GenerationRequest) -> Result<GenerationStream, ApiError> {
        let backends = select_backends(&request)?;
        let messages = prompts::assemble(&request);

        let image_backend = self.image_backend_for(&request);
        let cache = match (&image_backend, request.generation_type, &request.baseline) {
            (Some(_), GenerationType::Update, Some(baseline)) => {
                let cache = ImageCache::new();
                let seeded = seed_cache_from_baseline(&cache, baseline.latest_code());
                debug!(seeded, "Seeded image cache from baseline");
                Some(Arc::new(cache))
            }
            _ => None,
        };

        info!(
            stack = %request.stack,
            input_mode = %request.input_mode,
            generation_type = %request.generation_type,
            variants = backends.len(),
            backends = ?backends.iter().map(|b| b.id()).collect::<Vec<_>>(),
            image_generation = image_backend.is_some(),
            "Starting generation"
        );

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        for (index, model) in backends.iter().copied().enumerate() {
            let supervisor = Supervisor {
                variant: Variant::new(index, model),
                backend: self.factory.generation_backend(model, &request.credentials),
                messages: messages.clone(),
                images: image_backend.clone(),
                cache: cache.clone(),
                out: tx.clone(),
                cancel: cancel.child_token(),
                grace: self.settings.cancel_grace,
            };
            tokio::spawn(supervisor.run());
        }

        Ok(GenerationStream {
            events: rx,
            backends,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        })
    }

    /// Run a request to completion and collect each variant's final artifact
    pub async fn generate_all(
        &self,
        request: GenerationRequest,
    ) -> Result<Vec<VariantOutcome>, ApiError> {
        let mut stream = self.start(request)?;
        let mut outcomes: Vec<VariantOutcome> = stream
            .backends()
            .iter()
            .enumerate()
            .map(|(variant_index, backend)| VariantOutcome {
                variant_index,
                backend: *backend,
                result: Err("Variant ended without a result".to_string()),
            })
            .collect();

        while let Some(StreamEvent {
            variant_index,
            event,
        }) = stream.recv().await
        {
            let Some(outcome) = outcomes.get_mut(variant_index) else {
                continue;
            };
            match event {
                WorkerEvent::Complete(artifact) => outcome.result = Ok(artifact),
                WorkerEvent::Error(message) => outcome.result = Err(message),
                WorkerEvent::Status(_) | WorkerEvent::Chunk(_) => {}
            }
        }
        Ok(outcomes)
    }

    fn image_backend_for(&self, request: &GenerationRequest) -> Option<Arc<dyn ImageBackend>> {
        if !(self.settings.image_generation && request.image_generation) {
            return None;
        }
        match self.factory.image_backend(&request.credentials) {
            Ok(backend) => {
                if backend.is_none() {
                    debug!("No image-capable credential, placeholders are left as-is");
                }
                backend
            }
            Err(err) => {
                warn!(error = %err, "Image backend unavailable, skipping image generation");
                None
            }
        }
    }
}

struct Supervisor {
    variant: Variant,
    backend: Result<Arc<dyn GenerationBackend>, ProviderError>,
    messages: Vec<ChatMessage>,
    images: Option<Arc<dyn ImageBackend>>,
    cache: Option<Arc<ImageCache>>,
    out: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
    grace: Duration,
}

impl Supervisor {
    fn emit(&self, event: WorkerEvent) -> bool {
        let sent = self
            .out
            .send(StreamEvent {
                variant_index: self.variant.index,
                event,
            })
            .is_ok();
        if !sent {
            // Receiver is gone; treat as cancellation
            self.cancel.cancel();
        }
        sent
    }

    async fn run(mut self) {
        let started = Instant::now();
        let index = self.variant.index;
        let model = self.variant.backend;

        if !self.emit(WorkerEvent::Status(STATUS_GENERATING_CODE.to_string())) {
            return;
        }

        let backend = match self.backend.clone() {
            Ok(backend) => backend,
            Err(err) => {
                warn!(variant_index = index, backend = %model, error = %err, "Backend could not be created");
                self.variant.finish(VariantStatus::Failed);
                self.emit(WorkerEvent::Error(err.to_string()));
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = VariantWorker::new(index, backend, std::mem::take(&mut self.messages));
        let mut handle = tokio::spawn(worker.run(tx, self.cancel.clone()));

        let artifact = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                event = rx.recv() => event,
            };
            match event {
                Some(WorkerEvent::Chunk(chunk)) => {
                    self.variant.record_chunk(&chunk);
                    if !self.emit(WorkerEvent::Chunk(chunk)) {
                        break None;
                    }
                }
                Some(WorkerEvent::Status(text)) => {
                    if !self.emit(WorkerEvent::Status(text)) {
                        break None;
                    }
                }
                Some(WorkerEvent::Complete(artifact)) => break Some(artifact),
                Some(WorkerEvent::Error(message)) => {
                    self.variant.finish(VariantStatus::Failed);
                    info!(
                        variant_index = index,
                        backend = %model,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Variant failed"
                    );
                    self.emit(WorkerEvent::Error(message));
                    return;
                }
                None => break None,
            }
        };

        let Some(artifact) = artifact else {
            if self.cancel.is_cancelled() {
                // Give the worker a bounded window to drop its request
                if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
                    handle.abort();
                }
                debug!(variant_index = index, backend = %model, "Variant cancelled");
                return;
            }
            // Worker ended without a terminal event, e.g. it panicked
            let cause = match handle.await {
                Err(join_err) if join_err.is_panic() => "Worker panicked".to_string(),
                _ => "Worker stopped without a result".to_string(),
            };
            self.variant.finish(VariantStatus::Failed);
            self.emit(WorkerEvent::Error(cause));
            return;
        };

        let artifact = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            artifact = self.post_process(artifact) => artifact,
        };
        let Some(artifact) = artifact else {
            debug!(variant_index = index, backend = %model, "Variant cancelled during image pass");
            return;
        };

        if self.cancel.is_cancelled() {
            return;
        }
        self.variant.finish(VariantStatus::Completed);
        info!(
            variant_index = index,
            backend = %model,
            bytes = artifact.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Variant completed"
        );
        self.emit(WorkerEvent::Status(STATUS_COMPLETE.to_string()));
        self.emit(WorkerEvent::Complete(artifact));
    }

    // Resolve placeholders; returns `None` if the receiver went away mid-pass
    async fn post_process(&self, artifact: String) -> Option<String> {
        let Some(images) = &self.images else {
            return Some(artifact);
        };
        if find_placeholders(&artifact).is_empty() {
            return Some(artifact);
        }
        if !self.emit(WorkerEvent::Status(STATUS_GENERATING_IMAGES.to_string())) {
            return None;
        }
        let resolution = resolve_images(&artifact, images.as_ref(), self.cache.as_deref()).await;
        if !resolution.failed.is_empty() {
            let note = format!(
                "{} image(s) could not be generated; placeholders were kept.",
                resolution.failed.len()
            );
            if !self.emit(WorkerEvent::Status(note)) {
                return None;
            }
        }
        Some(resolution.html)
    }
}
