//! Model and Stack Catalog
//!
//! Closed enumerations of the supported output stacks, input modes, generation types and
//! backend models, plus the static catalog served at request-validation time.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format the generated artifact is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stack {
    HtmlTailwind,
    HtmlCss,
    ReactTailwind,
    Bootstrap,
    IonicTailwind,
    VueTailwind,
    Svg,
}

impl Stack {
    pub const ALL: [Stack; 7] = [
        Stack::HtmlTailwind,
        Stack::HtmlCss,
        Stack::ReactTailwind,
        Stack::Bootstrap,
        Stack::IonicTailwind,
        Stack::VueTailwind,
        Stack::Svg,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Stack::HtmlTailwind => "html_tailwind",
            Stack::HtmlCss => "html_css",
            Stack::ReactTailwind => "react_tailwind",
            Stack::Bootstrap => "bootstrap",
            Stack::IonicTailwind => "ionic_tailwind",
            Stack::VueTailwind => "vue_tailwind",
            Stack::Svg => "svg",
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Stack {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stack::ALL
            .into_iter()
            .find(|stack| stack.id() == s)
            .ok_or_else(|| ApiError::UnsupportedStack(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Image,
    Video,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Image => f.write_str("image"),
            InputMode::Video => f.write_str("video"),
        }
    }
}

impl FromStr for InputMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(InputMode::Image),
            "video" => Ok(InputMode::Video),
            other => Err(ApiError::UnsupportedMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    /// Regenerate from scratch
    Create,
    /// Incrementally update an existing baseline
    Update,
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationType::Create => f.write_str("create"),
            GenerationType::Update => f.write_str("update"),
        }
    }
}

impl FromStr for GenerationType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(GenerationType::Create),
            "update" => Ok(GenerationType::Update),
            other => Err(ApiError::InvalidRequest(format!(
                "Unknown generation type: {} (must be 'create' or 'update')",
                other
            ))),
        }
    }
}

/// A group of backend entries sharing one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    Anthropic,
    OpenAI,
    Gemini,
}

impl BackendFamily {
    /// Selection priority when more families are eligible than variants allowed.
    pub const PRIORITY: [BackendFamily; 3] = [
        BackendFamily::Anthropic,
        BackendFamily::OpenAI,
        BackendFamily::Gemini,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackendFamily::Anthropic => "anthropic",
            BackendFamily::OpenAI => "openai",
            BackendFamily::Gemini => "gemini",
        }
    }

    /// Whether the family accepts video input
    pub fn supports_video(self) -> bool {
        matches!(self, BackendFamily::Gemini)
    }

    /// Entries used for `create`, most capable first
    pub fn create_entries(self) -> [BackendModel; 2] {
        match self {
            BackendFamily::Anthropic => [
                BackendModel::Claude37Sonnet20250219,
                BackendModel::Claude35Sonnet20241022,
            ],
            BackendFamily::OpenAI => [BackendModel::Gpt4o20241120, BackendModel::O120241217],
            BackendFamily::Gemini => [BackendModel::Gemini20Flash, BackendModel::Gemini20ProExp],
        }
    }

    /// The single focused entry used for `update`
    pub fn update_entry(self) -> BackendModel {
        match self {
            BackendFamily::Anthropic => BackendModel::Claude37Sonnet20250219,
            BackendFamily::OpenAI => BackendModel::Gpt4o20241120,
            BackendFamily::Gemini => BackendModel::Gemini20Flash,
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete generation backend entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendModel {
    Gpt4Vision,
    Gpt4Turbo20240409,
    Gpt4o20240513,
    Gpt4o20240806,
    Gpt4o20241120,
    O120241217,
    Claude3Sonnet,
    Claude3Opus,
    Claude3Haiku,
    Claude35Sonnet20240620,
    Claude35Sonnet20241022,
    Claude37Sonnet20250219,
    Gemini20FlashExp,
    Gemini20Flash,
    Gemini20ProExp,
}

impl BackendModel {
    pub const ALL: [BackendModel; 15] = [
        BackendModel::Gpt4Vision,
        BackendModel::Gpt4Turbo20240409,
        BackendModel::Gpt4o20240513,
        BackendModel::Gpt4o20240806,
        BackendModel::Gpt4o20241120,
        BackendModel::O120241217,
        BackendModel::Claude3Sonnet,
        BackendModel::Claude3Opus,
        BackendModel::Claude3Haiku,
        BackendModel::Claude35Sonnet20240620,
        BackendModel::Claude35Sonnet20241022,
        BackendModel::Claude37Sonnet20250219,
        BackendModel::Gemini20FlashExp,
        BackendModel::Gemini20Flash,
        BackendModel::Gemini20ProExp,
    ];

    /// Wire identifier, also the upstream model name
    pub fn id(self) -> &'static str {
        match self {
            BackendModel::Gpt4Vision => "gpt-4-vision-preview",
            BackendModel::Gpt4Turbo20240409 => "gpt-4-turbo-2024-04-09",
            BackendModel::Gpt4o20240513 => "gpt-4o-2024-05-13",
            BackendModel::Gpt4o20240806 => "gpt-4o-2024-08-06",
            BackendModel::Gpt4o20241120 => "gpt-4o-2024-11-20",
            BackendModel::O120241217 => "o1-2024-12-17",
            BackendModel::Claude3Sonnet => "claude-3-sonnet-20240229",
            BackendModel::Claude3Opus => "claude-3-opus-20240229",
            BackendModel::Claude3Haiku => "claude-3-haiku-20240307",
            BackendModel::Claude35Sonnet20240620 => "claude-3-5-sonnet-20240620",
            BackendModel::Claude35Sonnet20241022 => "claude-3-5-sonnet-20241022",
            BackendModel::Claude37Sonnet20250219 => "claude-3-7-sonnet-20250219",
            BackendModel::Gemini20FlashExp => "gemini-2.0-flash-exp",
            BackendModel::Gemini20Flash => "gemini-2.0-flash",
            BackendModel::Gemini20ProExp => "gemini-2.0-pro-exp-02-05",
        }
    }

    pub fn family(self) -> BackendFamily {
        match self {
            BackendModel::Gpt4Vision
            | BackendModel::Gpt4Turbo20240409
            | BackendModel::Gpt4o20240513
            | BackendModel::Gpt4o20240806
            | BackendModel::Gpt4o20241120
            | BackendModel::O120241217 => BackendFamily::OpenAI,
            BackendModel::Claude3Sonnet
            | BackendModel::Claude3Opus
            | BackendModel::Claude3Haiku
            | BackendModel::Claude35Sonnet20240620
            | BackendModel::Claude35Sonnet20241022
            | BackendModel::Claude37Sonnet20250219 => BackendFamily::Anthropic,
            BackendModel::Gemini20FlashExp
            | BackendModel::Gemini20Flash
            | BackendModel::Gemini20ProExp => BackendFamily::Gemini,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            BackendModel::Gpt4Vision
            | BackendModel::Gpt4Turbo20240409
            | BackendModel::Gpt4o20240513 => 4096,
            BackendModel::Gpt4o20240806 | BackendModel::Gpt4o20241120 => 16384,
            BackendModel::O120241217 | BackendModel::Claude37Sonnet20250219 => 20000,
            _ => 8192,
        }
    }

    /// Reasoning models reject a temperature parameter
    pub fn accepts_temperature(self) -> bool {
        !matches!(self, BackendModel::O120241217)
    }

    /// Reasoning models answer in one piece
    pub fn supports_streaming(self) -> bool {
        !matches!(self, BackendModel::O120241217)
    }

    /// Deprecated entries still parse but are hidden from the public catalog
    pub fn is_deprecated(self) -> bool {
        matches!(
            self,
            BackendModel::Gpt4Vision
                | BackendModel::Gpt4Turbo20240409
                | BackendModel::Claude3Sonnet
                | BackendModel::Claude3Opus
                | BackendModel::Claude3Haiku
        )
    }

    pub fn supports_video(self) -> bool {
        self.family().supports_video()
    }
}

impl fmt::Display for BackendModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BackendModel {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendModel::ALL
            .into_iter()
            .find(|model| model.id() == s)
            .ok_or_else(|| ApiError::UnknownBackend(s.to_string()))
    }
}

impl Serialize for BackendModel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for BackendModel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Static catalog listing served to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub models: Vec<String>,
    pub stacks: Vec<String>,
}

pub fn catalog() -> Catalog {
    Catalog {
        models: BackendModel::ALL
            .into_iter()
            .filter(|model| !model.is_deprecated())
            .map(|model| model.id().to_string())
            .collect(),
        stacks: Stack::ALL.into_iter().map(|s| s.id().to_string()).collect(),
    }
}
