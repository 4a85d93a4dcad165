//! Frames received from the chat server.
//!
//! Every payload on the realtime channel is a JSON object whose `type`
//! field selects the variant of [`InboundFrame`]. Decoding goes through
//! [`InboundFrame::decode`], which separates *unknown* tags (the server is
//! allowed to send frames this client does not consume) from *malformed*
//! payloads.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::emotion::EmotionAnalysis;
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A single chat message as displayed in the conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Server-assigned id, or a synthesized millisecond timestamp for
    /// system messages.
    pub id: i64,
    /// Message text.
    pub content: String,
    /// True when the user wrote the message, false for assistant and
    /// system messages.
    #[serde(default)]
    pub is_user: bool,
    /// Creation time as sent by the server (ISO-8601, zone optional).
    pub timestamp: String,
    /// Emotion analysis computed by the backend, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_analysis: Option<EmotionAnalysis>,
}

impl ChatMessage {
    /// Build the log entry for a `system_message` frame received at `now`.
    ///
    /// System frames carry only their text; the id is the arrival time in
    /// Unix milliseconds and the timestamp is the arrival time in RFC 3339.
    pub fn system(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: now.timestamp_millis(),
            content: content.into(),
            is_user: false,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            emotion_analysis: None,
        }
    }
}

// ---------------------------------------------------------------------------
// InboundFrame
// ---------------------------------------------------------------------------

/// Discriminated union of everything the chat server sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A user or assistant message to append to the conversation.
    Message(ChatMessage),
    /// Whether the assistant is currently composing a reply.
    TypingIndicator {
        /// Missing values read as `false`.
        #[serde(default)]
        is_typing: bool,
    },
    /// Server notice shown inline in the conversation.
    SystemMessage {
        /// Notice text.
        content: String,
    },
    /// Server-side failure report.
    Error {
        /// Human-readable error text.
        content: String,
    },
}

impl InboundFrame {
    /// Every `type` tag this client understands.
    pub const KNOWN_TYPES: [&'static str; 4] =
        ["message", "typing_indicator", "system_message", "error"];

    /// Decode one text payload.
    ///
    /// # Errors
    ///
    /// * [`ModelError::MalformedFrame`] if the payload is not JSON or does
    ///   not match the shape of its tag.
    /// * [`ModelError::MissingField`] if there is no string `type` field.
    /// * [`ModelError::UnknownFrameType`] if the tag is not one of
    ///   [`Self::KNOWN_TYPES`].
    pub fn decode(raw: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| ModelError::MalformedFrame {
            reason: e.to_string(),
        })?;

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::MissingField {
                field: "type".into(),
            })?;

        if !Self::KNOWN_TYPES.contains(&tag) {
            return Err(ModelError::UnknownFrameType {
                tag: tag.to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| ModelError::MalformedFrame {
            reason: e.to_string(),
        })
    }

    /// The wire tag of this frame.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::TypingIndicator { .. } => "typing_indicator",
            Self::SystemMessage { .. } => "system_message",
            Self::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
