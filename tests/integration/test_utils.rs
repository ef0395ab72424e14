//! Shared test utilities: scripted backends, a scripted factory and request builders.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use shotcode::catalog::{BackendModel, Stack};
use shotcode::error::ProviderError;
use shotcode::orchestrator::{Orchestrator, OrchestratorSettings, StreamEvent};
use shotcode::prompts::{ChatMessage, ContentPart};
use shotcode::provider::{BackendFactory, GenerationBackend, ImageBackend, TextStream};
use shotcode::request::{Credentials, GenerationRequest};
use shotcode::worker::WorkerEvent;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a scripted backend behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub chunks: Vec<String>,
    pub delay: Duration,
    /// Fail the stream instead of yielding this chunk index
    pub fail_at: Option<usize>,
    /// Fail before the stream starts
    pub fail_start: bool,
    /// Fail at start when the input media equals this data URL
    pub fail_on_media: Option<String>,
    /// Cycle through `chunks` forever
    pub endless: bool,
    pub tally: Option<StreamTally>,
}

/// Counters shared with the streams a scripted backend opens
#[derive(Debug, Clone, Default)]
pub struct StreamTally {
    produced: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl StreamTally {
    /// Chunks yielded across all streams
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    /// Streams not yet dropped
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

// Lives inside a scripted stream; dropping the stream closes it.
struct OpenStream(StreamTally);

impl OpenStream {
    fn new(tally: StreamTally) -> Self {
        tally.open.fetch_add(1, Ordering::SeqCst);
        Self(tally)
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Script {
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn failing_on_media(mut self, data_url: impl Into<String>) -> Self {
        self.fail_on_media = Some(data_url.into());
        self
    }

    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    pub fn with_tally(mut self, tally: StreamTally) -> Self {
        self.tally = Some(tally);
        self
    }
}

pub struct ScriptedBackend {
    model: BackendModel,
    script: Script,
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, ProviderError> {
        let media_matches = self.script.fail_on_media.as_ref().is_some_and(|target| {
            messages.iter().any(|message| {
                message
                    .content
                    .iter()
                    .any(|part| matches!(part, ContentPart::Media(url) if url == target))
            })
        });
        if self.script.fail_start || media_matches {
            return Err(ProviderError::Auth {
                backend: self.model.id().to_string(),
            });
        }

        let backend = self.model.id().to_string();
        let delay = self.script.delay;
        let fail_at = self.script.fail_at;
        let chunks = self.script.chunks.clone();
        let indices: Box<dyn Iterator<Item = usize> + Send> =
            if self.script.endless && !chunks.is_empty() {
                Box::new(0..)
            } else {
                Box::new(0..chunks.len())
            };
        let guard = OpenStream::new(self.script.tally.clone().unwrap_or_default());
        let items = stream::iter(indices).then(move |index| {
            let backend = backend.clone();
            let chunk = chunks[index % chunks.len()].clone();
            let produced = guard.0.produced.clone();
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if fail_at == Some(index) {
                    Err(ProviderError::Stream {
                        backend,
                        message: "connection reset".to_string(),
                    })
                } else {
                    produced.fetch_add(1, Ordering::SeqCst);
                    Ok(chunk)
                }
            }
        });
        Ok(Box::pin(items))
    }

    fn backend_name(&self) -> &str {
        self.model.id()
    }
}

/// Image backend returning `https://img.test/{n}.png`, counting calls
#[derive(Default)]
pub struct CountingImages {
    pub calls: AtomicUsize,
    pub delay: Duration,
    /// Prompts containing this text fail
    pub fail_when: Option<String>,
}

impl CountingImages {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageBackend for CountingImages {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_when.as_deref().is_some_and(|needle| prompt.contains(needle)) {
            return Err(ProviderError::RateLimited {
                backend: "dall-e-3".to_string(),
                message: "quota".to_string(),
            });
        }
        Ok(format!("https://img.test/{}.png", n))
    }
}

/// Factory serving scripted backends; unknown models answer with a small document
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: HashMap<BackendModel, Script>,
    images: Option<Arc<CountingImages>>,
    pub created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, model: BackendModel, script: Script) -> Self {
        self.scripts.insert(model, script);
        self
    }

    pub fn images(mut self, images: Arc<CountingImages>) -> Self {
        self.images = Some(images);
        self
    }
}

impl BackendFactory for ScriptedFactory {
    fn generation_backend(
        &self,
        model: BackendModel,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn GenerationBackend>, ProviderError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.get(&model).cloned().unwrap_or_else(|| {
            Script::chunks([format!("<html><body>{}</body></html>", model.id())])
        });
        Ok(Arc::new(ScriptedBackend { model, script }))
    }

    fn image_backend(
        &self,
        _credentials: &Credentials,
    ) -> Result<Option<Arc<dyn ImageBackend>>, ProviderError> {
        Ok(self
            .images
            .clone()
            .map(|images| images as Arc<dyn ImageBackend>))
    }
}

pub fn orchestrator(factory: ScriptedFactory) -> Orchestrator {
    Orchestrator::new(Arc::new(factory), OrchestratorSettings::default())
}

pub fn openai_credentials() -> Credentials {
    Credentials {
        openai_api_key: Some("sk-test".to_string()),
        ..Default::default()
    }
}

pub fn all_credentials() -> Credentials {
    Credentials {
        openai_api_key: Some("sk-test".to_string()),
        anthropic_api_key: Some("ak-test".to_string()),
        gemini_api_key: Some("gk-test".to_string()),
        ..Default::default()
    }
}

pub fn image_request(credentials: Credentials) -> GenerationRequest {
    GenerationRequest::create_from_image(
        Stack::HtmlTailwind,
        "data:image/png;base64,iVBORw0KGgo=",
        credentials,
        true,
    )
}

/// Events grouped by variant index, in arrival order
pub fn by_variant(events: &[StreamEvent]) -> BTreeMap<usize, Vec<WorkerEvent>> {
    let mut grouped: BTreeMap<usize, Vec<WorkerEvent>> = BTreeMap::new();
    for event in events {
        grouped
            .entry(event.variant_index)
            .or_default()
            .push(event.event.clone());
    }
    grouped
}

/// Exactly one terminal event per variant, and it is the last one
pub fn assert_terminal_last(events: &[WorkerEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected one terminal event in {:?}", events);
    assert!(events.last().is_some_and(WorkerEvent::is_terminal));
}
