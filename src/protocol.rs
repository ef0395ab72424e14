//! Outbound wire messages for the generation connection.

use crate::orchestrator::StreamEvent;
use crate::worker::WorkerEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Status,
    Chunk,
    /// Final artifact for a variant
    SetCode,
    Error,
}

/// `{type, value, variantIndex}`; `variantIndex` is absent only on connection-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_index: Option<usize>,
}

impl OutboundMessage {
    /// Fatal, connection-scoped error sent before closing
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Error,
            value: message.into(),
            variant_index: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, MessageType::SetCode | MessageType::Error)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","value":"Failed to encode message"}"#.to_string()
        })
    }
}

impl From<StreamEvent> for OutboundMessage {
    fn from(event: StreamEvent) -> Self {
        let (kind, value) = match event.event {
            WorkerEvent::Status(text) => (MessageType::Status, text),
            WorkerEvent::Chunk(text) => (MessageType::Chunk, text),
            WorkerEvent::Complete(code) => (MessageType::SetCode, code),
            WorkerEvent::Error(message) => (MessageType::Error, message),
        };
        Self {
            kind,
            value,
            variant_index: Some(event.variant_index),
        }
    }
}
