//! Structured output protocol.
//!
//! A process may interleave machine-readable messages with its ordinary
//! output by printing lines of the form
//!
//! ```text
//! ::ES::{"type":"progress","payload":{"percent":50,"msg":"copying"}}
//! ```
//!
//! Anything else, including a prefixed line whose JSON does not parse, is
//! plain text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a structured message line.
pub const MAGIC_PREFIX: &str = "::ES::";

/// Kind of structured message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Progress,
    Result,
    Error,
}

/// A decoded structured message with an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Value,
}

/// Progress update payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressPayload {
    #[serde(default)]
    pub percent: i64,
    #[serde(default)]
    pub msg: String,
}

/// Final result payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

impl StructuredMessage {
    /// Typed view of a progress payload.
    #[must_use]
    pub fn progress(&self) -> Option<ProgressPayload> {
        self.typed(MessageKind::Progress)
    }

    /// Typed view of a result payload.
    #[must_use]
    pub fn result(&self) -> Option<ResultPayload> {
        self.typed(MessageKind::Result)
    }

    /// Typed view of an error payload.
    #[must_use]
    pub fn error(&self) -> Option<ErrorPayload> {
        self.typed(MessageKind::Error)
    }

    fn typed<T: for<'de> Deserialize<'de>>(&self, kind: MessageKind) -> Option<T> {
        if self.kind != kind {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// One line of process output, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    Structured(StructuredMessage),
    Text(String),
}

/// Classify a single output line. Stateless; never buffers across lines.
#[must_use]
pub fn decode_line(line: &str) -> DecodedLine {
    line.trim()
        .strip_prefix(MAGIC_PREFIX)
        .and_then(|json| serde_json::from_str::<StructuredMessage>(json).ok())
        .map_or_else(|| DecodedLine::Text(line.to_string()), DecodedLine::Structured)
}
