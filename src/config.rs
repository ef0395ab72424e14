//! Configuration System
//!
//! Layered configuration loaded once at startup and passed explicitly to the orchestrator,
//! the eval driver and the server. Layers, lowest precedence first: built-in defaults, the
//! global config file, an explicit `--config` file, `SHOTCODE__SECTION__KEY` environment
//! variables, then the provider variables (`OPENAI_API_KEY`, ...).

use crate::error::ApiError;
use crate::evals::EvalsConfig;
use crate::logging::LoggingConfig;
use crate::orchestrator::OrchestratorSettings;
use crate::provider::BackendEndpoints;
use crate::request::Credentials;
use crate::screenshot::ScreenshotConfig;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
}

pub use sources::global_file::global_config_path;

/// Environment prefix for config keys, e.g. `SHOTCODE__SERVER__PORT`
pub const ENV_PREFIX: &str = "SHOTCODE";

/// Provider variables and the credential field each one fills
const PROVIDER_ENV: [(&str, &str); 5] = [
    ("OPENAI_API_KEY", "openai_api_key"),
    ("OPENAI_BASE_URL", "openai_base_url"),
    ("ANTHROPIC_API_KEY", "anthropic_api_key"),
    ("GEMINI_API_KEY", "gemini_api_key"),
    ("SCREENSHOTONE_API_KEY", "screenshot_api_key"),
];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Server-side credentials; a request's own credentials take precedence
    pub credentials: Credentials,
    pub generation: GenerationConfig,
    pub evals: EvalsConfig,
    pub screenshot: ScreenshotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: merge::merge_policy::DEFAULT_HOST.to_string(),
            port: merge::merge_policy::DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Server-wide image generation switch
    pub image_generation: bool,
    /// Wind-down window for cancelled workers
    pub cancel_grace_ms: u64,
    /// Whole-request timeout for backend calls
    pub request_timeout_secs: u64,
    pub anthropic_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            image_generation: true,
            cancel_grace_ms: 500,
            request_timeout_secs: 600,
            anthropic_base_url: None,
            gemini_base_url: None,
        }
    }
}

impl GenerationConfig {
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            image_generation: self.image_generation,
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backend_endpoints(&self) -> BackendEndpoints {
        BackendEndpoints {
            anthropic_base_url: self.anthropic_base_url.clone(),
            gemini_base_url: self.gemini_base_url.clone(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Server(String),
    Generation(String),
    Evals(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Server(msg) => write!(f, "server: {}", msg),
            ValidationError::Generation(msg) => write!(f, "generation: {}", msg),
            ValidationError::Evals(msg) => write!(f, "evals: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AppConfig {
    /// Validate the whole configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ValidationError::Server("host must not be empty".to_string()));
        }
        if self.generation.request_timeout_secs == 0 {
            errors.push(ValidationError::Generation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.evals.concurrency == 0 {
            errors.push(ValidationError::Evals(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.evals.outputs_per_case == 0 {
            errors.push(ValidationError::Evals(
                "outputs_per_case must be greater than 0".to_string(),
            ));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy with credential values replaced by `<set>`, safe to print
    pub fn redacted(&self) -> AppConfig {
        fn mask(value: &Option<String>) -> Option<String> {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .map(|_| "<set>".to_string())
        }
        let mut copy = self.clone();
        copy.credentials.openai_api_key = mask(&self.credentials.openai_api_key);
        copy.credentials.anthropic_api_key = mask(&self.credentials.anthropic_api_key);
        copy.credentials.gemini_api_key = mask(&self.credentials.gemini_api_key);
        copy.screenshot.api_key = mask(&self.screenshot.api_key);
        copy
    }

    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Builds an [`AppConfig`] from its layers
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    skip_global: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit config file; it must exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read variables from `vars` instead of the process environment
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn without_global_file(mut self) -> Self {
        self.skip_global = true;
        self
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|v| !v.trim().is_empty())
    }

    /// Load and validate
    pub fn load(&self) -> Result<AppConfig, ApiError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        if !self.skip_global {
            builder = sources::global_file::add_to_builder(builder)?;
        }
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ApiError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);
        let environment = match &self.env {
            Some(vars) => environment.source(Some(vars.clone().into_iter().collect())),
            None => environment,
        };
        builder = builder.add_source(environment);

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        self.apply_provider_env(&mut config);

        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }

    /// Load a single file over the defaults, ignoring every other layer
    pub fn load_from_file(path: &Path) -> Result<AppConfig, ApiError> {
        ConfigLoader::new()
            .with_file(path)
            .with_env(HashMap::new())
            .without_global_file()
            .load()
    }

    fn apply_provider_env(&self, config: &mut AppConfig) {
        for (name, field) in PROVIDER_ENV {
            let Some(value) = self.var(name) else {
                continue;
            };
            let slot = match field {
                "openai_api_key" => &mut config.credentials.openai_api_key,
                "openai_base_url" => &mut config.credentials.openai_base_url,
                "anthropic_api_key" => &mut config.credentials.anthropic_api_key,
                "gemini_api_key" => &mut config.credentials.gemini_api_key,
                _ => &mut config.screenshot.api_key,
            };
            *slot = Some(value);
        }
    }
}
