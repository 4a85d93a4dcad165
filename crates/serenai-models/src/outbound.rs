//! Commands the client writes to the chat socket.

use serde::{Deserialize, Serialize};

/// A frame sent from the client to the chat server.
///
/// # Examples
///
/// ```
/// use serenai_models::OutboundCommand;
///
/// let json = OutboundCommand::message("  hello  ").to_json().unwrap();
/// assert_eq!(json, r#"{"type":"message","content":"hello"}"#);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// A user chat message.
    Message {
        /// Message text, already trimmed.
        content: String,
    },
    /// Whether the user is currently typing.
    TypingStatus {
        /// Current typing state.
        is_typing: bool,
    },
}

impl OutboundCommand {
    /// Build a chat message, trimming surrounding whitespace.
    ///
    /// Content that is empty after trimming is kept as an empty message.
    pub fn message(content: &str) -> Self {
        Self::Message {
            content: content.trim().to_string(),
        }
    }

    /// Build a typing-status update.
    pub fn typing_status(is_typing: bool) -> Self {
        Self::TypingStatus { is_typing }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
