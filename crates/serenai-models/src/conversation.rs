//! Append-only conversation log.
//!
//! The log is shared by reference counting: cloning a [`ConversationLog`]
//! is cheap and the clone is an immutable snapshot. Appending to the
//! original copies the entries first if a snapshot is still alive, so a
//! snapshot handed to a consumer never changes under it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::frame::ChatMessage;

/// Where a log entry came from.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A `message` frame, as sent by the server.
    Chat,
    /// A `system_message` frame with synthesized id and timestamp.
    System,
}

/// One line of the conversation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Origin of the entry.
    pub kind: EntryKind,
    /// The message as displayed.
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// Ordered, append-only sequence of conversation entries.
///
/// Insertion order is display order. Entries are never reordered or
/// deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationLog {
    entries: Arc<Vec<LogEntry>>,
}

impl ConversationLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message received from the server.
    pub fn push_chat(&mut self, message: ChatMessage) {
        self.push(LogEntry {
            kind: EntryKind::Chat,
            message,
        });
    }

    /// Append a system notice received at `now`.
    pub fn push_system(&mut self, content: impl Into<String>, now: DateTime<Utc>) {
        self.push(LogEntry {
            kind: EntryKind::System,
            message: ChatMessage::system(content, now),
        });
    }

    fn push(&mut self, entry: LogEntry) {
        Arc::make_mut(&mut self.entries).push(entry);
    }

    /// All entries in display order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Iterate over the messages, dropping the entry kind.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter().map(|e| &e.message)
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was appended yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
