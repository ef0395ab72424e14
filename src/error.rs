//! Error types for the shotcode generation orchestrator and eval engine.

use std::path::PathBuf;
use thiserror::Error;

/// Backend-scoped failures. Reported through a single variant `error` event,
/// never fatal to the connection.
///
/// Display strings must never contain credential values.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Authentication failed for {backend}: check the configured API key")]
    Auth { backend: String },

    #[error("Rate limit or quota exceeded for {backend}: {message}")]
    RateLimited { backend: String, message: String },

    #[error("Request to {backend} timed out")]
    Timeout { backend: String },

    #[error("Malformed response from {backend}: {message}")]
    Malformed { backend: String, message: String },

    #[error("Request to {backend} failed with status {status}: {message}")]
    Request {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("Connection error talking to {backend}: {message}")]
    Transport { backend: String, message: String },

    #[error("Stream from {backend} ended unexpectedly: {message}")]
    Stream { backend: String, message: String },

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Short machine-readable cause, used for logging fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth { .. } => "auth",
            ProviderError::RateLimited { .. } => "quota",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Malformed { .. } => "malformed",
            ProviderError::Request { .. } => "request",
            ProviderError::Transport { .. } => "transport",
            ProviderError::Stream { .. } => "stream",
            ProviderError::NotConfigured(_) => "not_configured",
        }
    }
}

/// Request-scoped errors. Validation failures abort before any worker starts.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No API key available for {0} input. Add an OpenAI, Anthropic or Gemini key.")]
    NoCredentials(String),

    #[error("Unsupported input mode: {0}")]
    UnsupportedMode(String),

    #[error("Unsupported stack: {0}")]
    UnsupportedStack(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Eval engine errors. Fatal to the single call only.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("At least 2 result sets are required for a comparison, got {given}")]
    InsufficientSets { given: usize },

    #[error("Result set not found: {0}")]
    SetNotFound(PathBuf),

    #[error("Eval inputs directory not found: {0}")]
    InputsNotFound(PathBuf),

    #[error("Eval I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
