//! Prompt assembly
//!
//! Builds the chat messages sent to a generation backend from a validated request: a
//! stack-specific system prompt, the visual input, and (for updates) the baseline history.

use crate::catalog::{GenerationType, InputMode, Stack};
use crate::request::GenerationRequest;
use serde::{Deserialize, Serialize};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One part of a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentPart {
    Text(String),
    /// Image or video, as a data URL or remote URL
    Media(String),
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    /// Concatenated text parts
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Media(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split `data:<media_type>;base64,<payload>` into its media type and payload
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.split(';').next().filter(|m| !m.is_empty())?;
    Some((media_type, payload))
}

const PLACEHOLDER_RULES: &str = "\
- For images, use placeholder images from https://placehold.co and include a detailed \
description of the image in the alt text so that an image generation AI can generate the image later.
- Do not add comments in the code such as \"<!-- Add other navigation links as needed -->\" \
in place of writing the full code. WRITE THE FULL CODE.
- Repeat elements as needed to match the screenshot.";

fn stack_instructions(stack: Stack) -> &'static str {
    match stack {
        Stack::HtmlTailwind => "You are an expert Tailwind developer. Build a single page app using \
Tailwind, HTML and JS. Use this script to include Tailwind: \
<script src=\"https://cdn.tailwindcss.com\"></script>",
        Stack::HtmlCss => "You are an expert CSS developer. Build a single page app using CSS, \
HTML and JS. Put all styles in a <style> tag inside the document head.",
        Stack::ReactTailwind => "You are an expert React/Tailwind developer. Build a single page app \
using React and Tailwind CSS. Use these scripts to include React so that it can run on a \
standalone page: https://unpkg.com/react/umd/react.development.js, \
https://unpkg.com/react-dom/umd/react-dom.development.js and \
https://unpkg.com/@babel/standalone/babel.js. Include Tailwind with \
<script src=\"https://cdn.tailwindcss.com\"></script>",
        Stack::Bootstrap => "You are an expert Bootstrap developer. Build a single page app using \
Bootstrap, HTML and JS. Include Bootstrap 5 from the jsDelivr CDN.",
        Stack::IonicTailwind => "You are an expert Ionic/Tailwind developer. Build a single page \
app using Ionic and Tailwind CSS. Include Ionic with the @ionic/core CDN scripts and Tailwind \
with <script src=\"https://cdn.tailwindcss.com\"></script>. Use ionicons for icons.",
        Stack::VueTailwind => "You are an expert Vue/Tailwind developer. Build a single page app \
using Vue and Tailwind CSS. Use the global Vue 3 build from unpkg and Tailwind from \
https://cdn.tailwindcss.com. Use Vue via the Composition API in a <script> tag.",
        Stack::Svg => "You are an expert at building SVGs. Build an SVG that looks exactly like \
the screenshot. Use the full SVG specification and keep text as <text> elements.",
    }
}

fn output_rule(stack: Stack) -> &'static str {
    match stack {
        Stack::Svg => "Return only the full code in <svg></svg> tags.",
        _ => "Return only the full code in <html></html> tags. \
Do not include markdown \"```\" or \"```html\" at the start or end.",
    }
}

/// System prompt for a stack and input mode
pub fn system_prompt(stack: Stack, input_mode: InputMode) -> String {
    let source = match input_mode {
        InputMode::Image => "You take screenshots of a reference web page from the user, and then \
build single page apps that look exactly like the screenshot.",
        InputMode::Video => "You take a screen recording of a user interacting with a web app, \
and then build a single page app that reproduces every screen and interaction shown.",
    };
    format!(
        "{}\n{}\n\n- Make sure the app looks exactly like the input.\n\
- Use the exact text from the input.\n{}\n\n{}",
        stack_instructions(stack),
        source,
        PLACEHOLDER_RULES,
        output_rule(stack)
    )
}

fn user_prompt(stack: Stack, input_mode: InputMode) -> String {
    match (stack, input_mode) {
        (Stack::Svg, _) => "Generate code for a SVG that looks exactly like this.".to_string(),
        (_, InputMode::Video) => {
            "Generate code for a web page that reproduces this recording.".to_string()
        }
        (_, InputMode::Image) => "Generate code for a web page that looks exactly like this."
            .to_string(),
    }
}

/// Assemble the full message list for a request
pub fn assemble(request: &GenerationRequest) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::text(
            MessageRole::System,
            system_prompt(request.stack, request.input_mode),
        ),
        ChatMessage {
            role: MessageRole::User,
            content: vec![
                ContentPart::Media(request.input.data_url().to_string()),
                ContentPart::Text(user_prompt(request.stack, request.input_mode)),
            ],
        },
    ];

    if request.generation_type == GenerationType::Update {
        if let Some(baseline) = &request.baseline {
            for (i, turn) in baseline.turns.iter().enumerate() {
                let role = if i % 2 == 0 {
                    MessageRole::Assistant
                } else {
                    MessageRole::User
                };
                messages.push(ChatMessage::text(role, turn.clone()));
            }
        }
    }

    messages
}
