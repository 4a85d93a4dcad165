//! Plain-text rendering of the conversation and connection status.

use std::fmt::Write;

use chrono::{DateTime, NaiveDateTime};
use serenai_models::{EntryKind, LogEntry};
use serenai_sdk::{ChatSnapshot, ConnectionState};

/// Display time (`HH:MM`) of a message timestamp.
///
/// Accepts RFC 3339 and zone-less ISO-8601; anything else is shown as is.
pub fn clock(timestamp: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return dt.format("%H:%M").to_string();
    }
    match NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(dt) => dt.format("%H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// One conversation line.
pub fn format_entry(entry: &LogEntry) -> String {
    let message = &entry.message;
    let time = clock(&message.timestamp);

    if entry.kind == EntryKind::System {
        return format!("[{time}] * {}", message.content);
    }

    let who = if message.is_user { "You" } else { "SerenAI" };
    let mut line = format!("[{time}] {who}: {}", message.content);
    if let Some(analysis) = &message.emotion_analysis {
        if let Some(emotion) = analysis.emotion() {
            let _ = write!(line, "  ({emotion})");
        }
        if analysis.is_distressed() {
            line.push_str("  [!] high distress");
        }
    }
    line
}

/// Tracks which log entries have already been printed.
///
/// The log is append-only while signed in but discarded on sign-out, and a
/// watch receiver may skip the empty snapshot in between. The last printed
/// entry is remembered so a refilled log is printed from the start.
#[derive(Debug, Default)]
pub struct LogCursor {
    printed: usize,
    last: Option<LogEntry>,
}

impl LogCursor {
    /// Entries of `entries` not printed yet, and mark them printed.
    pub fn advance<'a>(&mut self, entries: &'a [LogEntry]) -> &'a [LogEntry] {
        let continues = match self.printed {
            0 => true,
            n => entries.get(n - 1) == self.last.as_ref(),
        };
        let start = if continues { self.printed } else { 0 };
        self.printed = entries.len();
        self.last = entries.last().cloned();
        &entries[start..]
    }
}

/// Status line for the connection.
pub fn status_line(snapshot: &ChatSnapshot) -> String {
    let mut line = match snapshot.state {
        ConnectionState::Idle => "signed out, use /login <token>".to_string(),
        ConnectionState::Connecting => "connecting...".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Retrying { attempt, delay } => format!(
            "disconnected, retry {attempt} in {:.1}s",
            delay.as_secs_f64()
        ),
        ConnectionState::GaveUp => "offline, use /reconnect to try again".to_string(),
        ConnectionState::Closed => "closed by server, use /reconnect".to_string(),
    };
    if let Some(error) = &snapshot.error {
        let _ = write!(line, " | {error}");
    }
    format!("-- {line} --")
}
