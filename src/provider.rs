//! Generation Backend Abstraction
//!
//! Unified interface over the code generation backends (OpenAI, Anthropic, Gemini) and the
//! image generation backend. Backends are black-box stream producers: the worker only sees a
//! stream of text deltas or a single `ProviderError`.

use crate::catalog::{BackendFamily, BackendModel};
use crate::error::ProviderError;
use crate::prompts::{split_data_url, ChatMessage, ContentPart, MessageRole};
use crate::request::Credentials;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub mod sse;

use sse::{SseDecoder, SseEvent};

/// Streaming completion type
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Code generation backend
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a generation and return its text deltas in order
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, ProviderError>;

    /// Backend identifier used in logs and error messages
    fn backend_name(&self) -> &str;
}

/// Image generation backend
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate one image for `prompt` and return its URL
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Builds backend clients for a request's credentials
pub trait BackendFactory: Send + Sync {
    fn generation_backend(
        &self,
        model: BackendModel,
        credentials: &Credentials,
    ) -> Result<Arc<dyn GenerationBackend>, ProviderError>;

    /// `None` when no image-capable credential is present
    fn image_backend(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Arc<dyn ImageBackend>>, ProviderError>;
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn build_provider_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

// Map transport errors; the request URL never carries a credential
fn map_http_error(backend: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            backend: backend.to_string(),
        }
    } else if error.is_connect() {
        ProviderError::Transport {
            backend: backend.to_string(),
            message: "connection failed".to_string(),
        }
    } else if error.is_decode() || error.is_body() {
        ProviderError::Malformed {
            backend: backend.to_string(),
            message: error.to_string(),
        }
    } else {
        ProviderError::Transport {
            backend: backend.to_string(),
            message: error.to_string(),
        }
    }
}

fn map_status(backend: &str, status: u16, body: &str) -> ProviderError {
    let message = truncate(body, 300);
    match status {
        401 | 403 => ProviderError::Auth {
            backend: backend.to_string(),
        },
        429 => ProviderError::RateLimited {
            backend: backend.to_string(),
            message,
        },
        400 | 422 => ProviderError::Malformed {
            backend: backend.to_string(),
            message,
        },
        _ => ProviderError::Request {
            backend: backend.to_string(),
            status,
            message,
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}... ({} chars)", head, text.chars().count())
}

async fn send_checked(
    backend: &str,
    request: reqwest::RequestBuilder,
) -> Result<Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_http_error(backend, e))?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(map_status(backend, status, &body));
    }
    Ok(response)
}

/// Extracts a text delta from one SSE event
type DeltaExtractor = fn(&str, &SseEvent) -> Result<Option<String>, ProviderError>;

struct SseState {
    backend: String,
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
    extract: DeltaExtractor,
}

impl SseState {
    fn accept(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match (self.extract)(&self.backend, &event) {
                Ok(Some(delta)) if !delta.is_empty() => self.pending.push_back(Ok(delta)),
                Ok(_) => {}
                Err(err) => {
                    self.pending.push_back(Err(err));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Turn a streaming HTTP response into ordered text deltas. The stream ends after the first
/// error; dropping it aborts the underlying request.
fn sse_text_stream(backend: &str, response: Response, extract: DeltaExtractor) -> TextStream {
    let state = SseState {
        backend: backend.to_string(),
        bytes: response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        extract,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.accept(events);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(ProviderError::Stream {
                        backend: state.backend.clone(),
                        message: map_http_error(&state.backend, e).to_string(),
                    }));
                    state.finished = true;
                }
                None => {
                    let events = state.decoder.finish();
                    state.accept(events);
                    state.finished = true;
                }
            }
        }
    }))
}

fn parse_json(backend: &str, data: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(data).map_err(|e| ProviderError::Malformed {
        backend: backend.to_string(),
        message: format!("invalid stream payload: {}", e),
    })
}

fn openai_delta(backend: &str, event: &SseEvent) -> Result<Option<String>, ProviderError> {
    if event.data.trim() == "[DONE]" || event.data.is_empty() {
        return Ok(None);
    }
    let value = parse_json(backend, &event.data)?;
    if let Some(error) = value.get("error") {
        return Err(ProviderError::Stream {
            backend: backend.to_string(),
            message: error["message"].as_str().unwrap_or("unknown error").to_string(),
        });
    }
    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

fn anthropic_delta(backend: &str, event: &SseEvent) -> Result<Option<String>, ProviderError> {
    match event.event.as_deref() {
        Some("content_block_delta") => {
            let value = parse_json(backend, &event.data)?;
            Ok(value["delta"]["text"].as_str().map(str::to_string))
        }
        Some("error") => {
            let value = parse_json(backend, &event.data)?;
            let kind = value["error"]["type"].as_str().unwrap_or("error");
            let message = value["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            if kind == "overloaded_error" || kind == "rate_limit_error" {
                Err(ProviderError::RateLimited {
                    backend: backend.to_string(),
                    message,
                })
            } else {
                Err(ProviderError::Stream {
                    backend: backend.to_string(),
                    message,
                })
            }
        }
        _ => Ok(None),
    }
}

fn gemini_delta(backend: &str, event: &SseEvent) -> Result<Option<String>, ProviderError> {
    if event.data.is_empty() {
        return Ok(None);
    }
    let value = parse_json(backend, &event.data)?;
    if let Some(error) = value.get("error") {
        return Err(ProviderError::Stream {
            backend: backend.to_string(),
            message: error["message"].as_str().unwrap_or("unknown error").to_string(),
        });
    }
    let parts = value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        });
    Ok(parts)
}

/// OpenAI chat completions client
pub struct OpenAIClient {
    client: Client,
    model: BackendModel,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(
        model: BackendModel,
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|message| {
                let only_text = message
                    .content
                    .iter()
                    .all(|part| matches!(part, ContentPart::Text(_)));
                let content = if only_text {
                    json!(message.text_content())
                } else {
                    json!(message
                        .content
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text(text) => json!({"type": "text", "text": text}),
                            ContentPart::Media(url) => json!({
                                "type": "image_url",
                                "image_url": {"url": url, "detail": "high"},
                            }),
                        })
                        .collect::<Vec<_>>())
                };
                json!({"role": message.role.as_str(), "content": content})
            })
            .collect();

        let mut body = json!({
            "model": self.model.id(),
            "messages": messages,
            "stream": stream,
        });
        if self.model.accepts_temperature() {
            body["temperature"] = json!(0.0);
            body["max_tokens"] = json!(self.model.max_tokens());
        } else {
            body["max_completion_tokens"] = json!(self.model.max_tokens());
        }
        body
    }
}

#[async_trait]
impl GenerationBackend for OpenAIClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, ProviderError> {
        let streaming = self.model.supports_streaming();
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&messages, streaming));
        let response = send_checked(self.backend_name(), request).await?;

        if streaming {
            return Ok(sse_text_stream(self.backend_name(), response, openai_delta));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| map_http_error(self.backend_name(), e))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed {
                backend: self.backend_name().to_string(),
                message: "No choices in response".to_string(),
            })?
            .to_string();
        Ok(Box::pin(stream::once(async move {
            Ok::<_, ProviderError>(content)
        })))
    }

    fn backend_name(&self) -> &str {
        self.model.id()
    }
}

/// Anthropic messages client
pub struct AnthropicClient {
    client: Client,
    model: BackendModel,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(
        model: BackendModel,
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let system = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n");

        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|message| {
                let content: Vec<Value> = message
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({"type": "text", "text": text}),
                        ContentPart::Media(url) => match split_data_url(url) {
                            Some((media_type, data)) => json!({
                                "type": "image",
                                "source": {"type": "base64", "media_type": media_type, "data": data},
                            }),
                            None => json!({
                                "type": "image",
                                "source": {"type": "url", "url": url},
                            }),
                        },
                    })
                    .collect();
                json!({"role": message.role.as_str(), "content": content})
            })
            .collect();

        json!({
            "model": self.model.id(),
            "max_tokens": self.model.max_tokens(),
            "temperature": 0.0,
            "system": system,
            "messages": turns,
            "stream": true,
        })
    }
}

#[async_trait]
impl GenerationBackend for AnthropicClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, ProviderError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request_body(&messages));
        let response = send_checked(self.backend_name(), request).await?;
        Ok(sse_text_stream(self.backend_name(), response, anthropic_delta))
    }

    fn backend_name(&self) -> &str {
        self.model.id()
    }
}

/// Gemini generateContent client
pub struct GeminiClient {
    client: Client,
    model: BackendModel,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        model: BackendModel,
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let system = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n");

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|message| {
                let role = if message.role == MessageRole::Assistant {
                    "model"
                } else {
                    "user"
                };
                let parts: Vec<Value> = message
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({"text": text}),
                        ContentPart::Media(url) => match split_data_url(url) {
                            Some((mime_type, data)) => {
                                json!({"inline_data": {"mime_type": mime_type, "data": data}})
                            }
                            None => json!({"file_data": {"file_uri": url}}),
                        },
                    })
                    .collect();
                json!({"role": role, "parts": parts})
            })
            .collect();

        json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": contents,
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": self.model.max_tokens(),
            },
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model.id()
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(&messages));
        let response = send_checked(self.backend_name(), request).await?;
        Ok(sse_text_stream(self.backend_name(), response, gemini_delta))
    }

    fn backend_name(&self) -> &str {
        self.model.id()
    }
}

/// OpenAI images client (DALL-E 3)
pub struct OpenAIImageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIImageClient {
    const MODEL: &'static str = "dall-e-3";

    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client(timeout)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl ImageBackend for OpenAIImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/images/generations", self.base_url.trim_end_matches('/'));
        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&json!({
            "model": Self::MODEL,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "quality": "standard",
            "style": "natural",
        }));
        let response = send_checked(Self::MODEL, request).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| map_http_error(Self::MODEL, e))?;
        value["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed {
                backend: Self::MODEL.to_string(),
                message: "No image URL in response".to_string(),
            })
    }
}

/// Endpoint overrides for the HTTP backends
#[derive(Debug, Clone, Default)]
pub struct BackendEndpoints {
    pub anthropic_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
}

/// Factory producing HTTP clients for real backends
pub struct HttpBackendFactory {
    endpoints: BackendEndpoints,
    timeout: Duration,
}

impl HttpBackendFactory {
    pub fn new(endpoints: BackendEndpoints, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }
}

impl Default for HttpBackendFactory {
    fn default() -> Self {
        Self::new(BackendEndpoints::default(), DEFAULT_REQUEST_TIMEOUT)
    }
}

impl BackendFactory for HttpBackendFactory {
    fn generation_backend(
        &self,
        model: BackendModel,
        credentials: &Credentials,
    ) -> Result<Arc<dyn GenerationBackend>, ProviderError> {
        let family = model.family();
        let key = credentials
            .key_for(family)
            .ok_or_else(|| ProviderError::NotConfigured(format!("no {} API key", family)))?
            .to_string();
        let backend: Arc<dyn GenerationBackend> = match family {
            BackendFamily::OpenAI => Arc::new(OpenAIClient::new(
                model,
                key,
                credentials.openai_base_url.clone(),
                self.timeout,
            )?),
            BackendFamily::Anthropic => Arc::new(AnthropicClient::new(
                model,
                key,
                self.endpoints.anthropic_base_url.clone(),
                self.timeout,
            )?),
            BackendFamily::Gemini => Arc::new(GeminiClient::new(
                model,
                key,
                self.endpoints.gemini_base_url.clone(),
                self.timeout,
            )?),
        };
        Ok(backend)
    }

    fn image_backend(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Arc<dyn ImageBackend>>, ProviderError> {
        let Some(key) = credentials.key_for(BackendFamily::OpenAI) else {
            return Ok(None);
        };
        Ok(Some(Arc::new(OpenAIImageClient::new(
            key.to_string(),
            credentials.openai_base_url.clone(),
            self.timeout,
        )?)))
    }
}
