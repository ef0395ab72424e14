//! Generation Request
//!
//! The wire-level parameter object sent once at connection start, and the validated,
//! immutable `GenerationRequest` the orchestrator works from. Validation happens once at
//! the boundary; invalid shapes never reach a worker.

use crate::catalog::{BackendFamily, BackendModel, GenerationType, InputMode, Stack};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend credentials. Presence, not validity, decides backend eligibility.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
}

impl Credentials {
    /// API key for a family, if one is present
    pub fn key_for(&self, family: BackendFamily) -> Option<&str> {
        let key = match family {
            BackendFamily::OpenAI => self.openai_api_key.as_deref(),
            BackendFamily::Anthropic => self.anthropic_api_key.as_deref(),
            BackendFamily::Gemini => self.gemini_api_key.as_deref(),
        };
        key.map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn has(&self, family: BackendFamily) -> bool {
        self.key_for(family).is_some()
    }

    /// Families with a credential present, in selection priority order
    pub fn families(&self) -> Vec<BackendFamily> {
        BackendFamily::PRIORITY
            .into_iter()
            .filter(|family| self.has(*family))
            .collect()
    }

    /// Fill absent credentials from `fallback`. Values already present win.
    pub fn merged_with(&self, fallback: &Credentials) -> Credentials {
        fn pick(primary: &Option<String>, secondary: &Option<String>) -> Option<String> {
            primary
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .or(secondary.as_ref().filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        }
        Credentials {
            openai_api_key: pick(&self.openai_api_key, &fallback.openai_api_key),
            openai_base_url: pick(&self.openai_base_url, &fallback.openai_base_url),
            anthropic_api_key: pick(&self.anthropic_api_key, &fallback.anthropic_api_key),
            gemini_api_key: pick(&self.gemini_api_key, &fallback.gemini_api_key),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            match value {
                Some(v) if !v.trim().is_empty() => "<set>",
                _ => "<unset>",
            }
        }
        f.debug_struct("Credentials")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .finish()
    }
}

/// Raw parameter object as received over the connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationParams {
    pub generated_code_config: String,
    #[serde(default = "default_input_mode")]
    pub input_mode: String,
    #[serde(default = "default_generation_type")]
    pub generation_type: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    /// Alternating baseline code and follow-up instructions, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default = "default_true")]
    pub is_image_generation_enabled: bool,
    #[serde(default)]
    pub open_ai_api_key: Option<String>,
    #[serde(default, rename = "openAiBaseURL")]
    pub open_ai_base_url: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Explicit backend override; bypasses family-based selection
    #[serde(default)]
    pub backends: Option<Vec<String>>,
}

fn default_input_mode() -> String {
    "image".to_string()
}

fn default_generation_type() -> String {
    "create".to_string()
}

fn default_true() -> bool {
    true
}

/// Visual input payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPayload {
    Image { data_url: String },
    Video { data_url: String },
}

impl InputPayload {
    pub fn data_url(&self) -> &str {
        match self {
            InputPayload::Image { data_url } | InputPayload::Video { data_url } => data_url,
        }
    }
}

/// Existing code plus follow-up instructions for `update` generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    /// Alternating assistant code and user instructions; always even length, code first
    pub turns: Vec<String>,
}

impl Baseline {
    /// The most recent code the update builds on
    pub fn latest_code(&self) -> &str {
        &self.turns[self.turns.len() - 2]
    }

    pub fn latest_instruction(&self) -> &str {
        &self.turns[self.turns.len() - 1]
    }
}

/// Validated, immutable request for one connection
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub stack: Stack,
    pub input_mode: InputMode,
    pub generation_type: GenerationType,
    pub credentials: Credentials,
    pub image_generation: bool,
    pub input: InputPayload,
    pub baseline: Option<Baseline>,
    pub backends: Option<Vec<BackendModel>>,
}

impl GenerationRequest {
    /// Build a `create` request for a single image, used by programmatic callers
    pub fn create_from_image(
        stack: Stack,
        data_url: impl Into<String>,
        credentials: Credentials,
        image_generation: bool,
    ) -> Self {
        Self {
            stack,
            input_mode: InputMode::Image,
            generation_type: GenerationType::Create,
            credentials,
            image_generation,
            input: InputPayload::Image {
                data_url: data_url.into(),
            },
            baseline: None,
            backends: None,
        }
    }

    pub fn with_backends(mut self, backends: Vec<BackendModel>) -> Self {
        self.backends = Some(backends);
        self
    }
}

impl GenerationParams {
    /// Parse the first inbound frame of a connection
    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw)
            .map_err(|e| ApiError::InvalidRequest(format!("Malformed parameters: {}", e)))
    }

    /// Validate into a `GenerationRequest`, filling absent credentials from `fallback`
    pub fn into_request(self, fallback: &Credentials) -> Result<GenerationRequest, ApiError> {
        let stack: Stack = self.generated_code_config.parse()?;
        let input_mode: InputMode = self.input_mode.parse()?;
        let generation_type: GenerationType = self.generation_type.parse()?;

        let input = match input_mode {
            InputMode::Image => InputPayload::Image {
                data_url: require_payload("image", self.image)?,
            },
            InputMode::Video => InputPayload::Video {
                data_url: require_payload("video", self.video)?,
            },
        };

        let baseline = match generation_type {
            GenerationType::Create => None,
            GenerationType::Update => {
                if self.history.len() < 2 || self.history.len() % 2 != 0 {
                    return Err(ApiError::InvalidRequest(format!(
                        "Update requires history of alternating code and instructions, got {} entries",
                        self.history.len()
                    )));
                }
                Some(Baseline {
                    turns: self.history,
                })
            }
        };

        let backends = self
            .backends
            .map(|ids| {
                ids.iter()
                    .map(|id| id.parse::<BackendModel>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        if matches!(&backends, Some(list) if list.is_empty()) {
            return Err(ApiError::InvalidRequest(
                "Backend override must name at least one backend".to_string(),
            ));
        }

        let supplied = Credentials {
            openai_api_key: self.open_ai_api_key,
            openai_base_url: self.open_ai_base_url,
            anthropic_api_key: self.anthropic_api_key,
            gemini_api_key: self.gemini_api_key,
        };

        Ok(GenerationRequest {
            stack,
            input_mode,
            generation_type,
            credentials: supplied.merged_with(fallback),
            image_generation: self.is_image_generation_enabled,
            input,
            baseline,
            backends,
        })
    }
}

fn require_payload(field: &str, value: Option<String>) -> Result<String, ApiError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest(format!("Missing '{}' payload", field)))?;
    if !(value.starts_with("data:") || value.starts_with("http://") || value.starts_with("https://"))
    {
        return Err(ApiError::InvalidRequest(format!(
            "'{}' payload must be a data URL or http(s) URL",
            field
        )));
    }
    Ok(value)
}
