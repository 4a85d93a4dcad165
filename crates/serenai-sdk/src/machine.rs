//! Connection state machine.
//!
//! [`ConnectionMachine`] holds everything the chat connection manager
//! knows: lifecycle state, retry counter, last error, typing flag and the
//! conversation log. It performs no I/O. Every input returns the list of
//! [`Effect`]s the driver must carry out, in order.
//!
//! ```text
//!            credential            open
//!   Idle ───────────────► Connecting ─────► Connected
//!    ▲                     ▲    │               │
//!    │ credential lost     │    │ close ≠ 1000  │ close ≠ 1000
//!    │ / teardown          │    ▼               ▼
//!    │             timer   Retrying { attempt, delay }
//!    │                           │ attempts exhausted
//!    │                           ▼
//!    └──────────────────────  GaveUp   (reconnect() → Connecting)
//! ```
//!
//! A close with code 1000 moves to `Closed` and is never retried.
//!
//! Each transport session has a generation number. Inputs tagged with a
//! generation other than the active one belong to a session the machine
//! already abandoned and are ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serenai_models::{ConversationLog, InboundFrame, OutboundCommand};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::credentials::Credential;
use crate::endpoints::ChatEndpoints;

/// Close code for a clean, intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the socket dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Error recorded when a message is sent without an open socket.
pub const NOT_CONNECTED_ERROR: &str = "Not connected to chat server";
/// Error recorded when the transport reports a failure.
pub const CONNECTION_ERROR: &str = "Connection error occurred";
/// Error recorded when a session could not be started at all.
pub const CONNECT_FAILED_ERROR: &str = "Failed to connect to chat server";

// ---------------------------------------------------------------------------
// State and effects
// ---------------------------------------------------------------------------

/// Lifecycle state of the chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No credential, or torn down.
    Idle,
    /// Waiting for the transport to open.
    Connecting,
    /// Socket open; sends are accepted.
    Connected,
    /// Disconnected; automatic attempt `attempt` starts after `delay`.
    Retrying {
        /// 1-indexed attempt number that the timer will start.
        attempt: u32,
        /// Backoff delay scheduled for that attempt.
        delay: Duration,
    },
    /// Automatic attempts exhausted; only `reconnect()` resumes.
    GaveUp,
    /// The server closed the socket cleanly; not retried.
    Closed,
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start a new transport session.
    Open {
        /// Generation tag for the session's events.
        generation: u64,
        /// Socket URL, credential included.
        url: Url,
    },
    /// Write a text frame on the session.
    Write {
        /// Target session.
        generation: u64,
        /// JSON payload.
        text: String,
    },
    /// Close the session with the given code.
    Close {
        /// Target session.
        generation: u64,
        /// WebSocket close code.
        code: u16,
    },
    /// Arm the retry timer, replacing any pending one.
    ScheduleRetry {
        /// Time until [`ConnectionMachine::retry_due`] should be called.
        delay: Duration,
    },
    /// Disarm the retry timer.
    CancelRetry,
}

/// Immutable view of the manager, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// True only in [`ConnectionState::Connected`].
    pub connected: bool,
    /// Automatic attempts made since the last successful open.
    pub attempts: u32,
    /// The conversation so far.
    pub messages: ConversationLog,
    /// Last typing-indicator value received.
    pub is_typing: bool,
    /// Last error from any source, cleared on a successful open.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ConnectionMachine
// ---------------------------------------------------------------------------

/// Pure state machine behind the chat connection manager.
#[derive(Debug)]
pub struct ConnectionMachine {
    endpoints: ChatEndpoints,
    policy: BackoffPolicy,
    credential: Option<Credential>,
    state: ConnectionState,
    attempts: u32,
    generation: u64,
    active: Option<u64>,
    error: Option<String>,
    is_typing: bool,
    log: ConversationLog,
    disposed: bool,
}

impl ConnectionMachine {
    /// A machine in [`ConnectionState::Idle`] without credential.
    pub fn new(endpoints: ChatEndpoints, policy: BackoffPolicy) -> Self {
        Self {
            endpoints,
            policy,
            credential: None,
            state: ConnectionState::Idle,
            attempts: 0,
            generation: 0,
            active: None,
            error: None,
            is_typing: false,
            log: ConversationLog::new(),
            disposed: false,
        }
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// The injected credential changed.
    ///
    /// Losing the credential tears the session down and discards the
    /// conversation. A new or different credential replaces the current
    /// session with a fresh attempt.
    pub fn set_credential(&mut self, credential: Option<Credential>) -> Vec<Effect> {
        if self.disposed || credential == self.credential {
            return Vec::new();
        }
        self.credential = credential;

        let mut effects = self.stop_session();
        if self.credential.is_some() {
            info!("credential available, connecting");
            effects.extend(self.open());
        } else {
            info!("credential removed, going idle");
            self.enter_idle();
            self.log = ConversationLog::new();
            self.error = None;
        }
        effects
    }

    /// The transport of session `generation` reported open.
    pub fn transport_opened(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        info!(generation, "chat socket connected");
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.error = None;
        Vec::new()
    }

    /// The transport of session `generation` delivered a text payload.
    ///
    /// Payloads that fail to decode are logged and dropped without
    /// touching any state.
    pub fn transport_frame(&mut self, generation: u64, raw: &str, now: DateTime<Utc>) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) if e.is_unknown_type() => {
                debug!(error = %e, "ignoring frame");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Vec::new();
            }
        };
        debug!(generation, frame_type = frame.frame_type(), "frame received");

        match frame {
            InboundFrame::Message(message) => {
                debug!(id = message.id, is_user = message.is_user, "message received");
                self.log.push_chat(message);
            }
            InboundFrame::TypingIndicator { is_typing } => {
                self.is_typing = is_typing;
            }
            InboundFrame::SystemMessage { content } => {
                self.log.push_system(content, now);
            }
            InboundFrame::Error { content } => {
                warn!(%content, "server reported an error");
                self.error = Some(content);
            }
        }
        Vec::new()
    }

    /// The transport of session `generation` reported an error.
    ///
    /// Only records the error; the close that follows drives the retry.
    pub fn transport_error(&mut self, generation: u64, detail: &str) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        warn!(generation, %detail, "chat socket error");
        self.error = Some(CONNECTION_ERROR.to_string());
        Vec::new()
    }

    /// Session `generation` could not be started, e.g. its URL was
    /// rejected before any network traffic.
    ///
    /// Records [`CONNECT_FAILED_ERROR`]; the close that follows drives the
    /// retry.
    pub fn transport_unreachable(&mut self, generation: u64, detail: &str) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        warn!(generation, %detail, "chat socket could not be started");
        self.error = Some(CONNECT_FAILED_ERROR.to_string());
        Vec::new()
    }

    /// The transport of session `generation` closed.
    pub fn transport_closed(&mut self, generation: u64, code: u16, reason: &str) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        self.active = None;
        info!(generation, code, %reason, "chat socket closed");

        if code == NORMAL_CLOSURE {
            self.state = ConnectionState::Closed;
            return Vec::new();
        }

        if self.policy.allows_retry_after(self.attempts) {
            let attempt = self.attempts + 1;
            let delay = self.policy.delay_for(attempt);
            info!(attempt, ?delay, "scheduling reconnect");
            self.state = ConnectionState::Retrying { attempt, delay };
            vec![Effect::ScheduleRetry { delay }]
        } else {
            warn!(attempts = self.attempts, "giving up on chat socket");
            self.state = ConnectionState::GaveUp;
            self.error = Some(format!(
                "Unable to reach chat server after {} attempts",
                self.attempts
            ));
            Vec::new()
        }
    }

    /// The retry timer fired.
    pub fn retry_due(&mut self) -> Vec<Effect> {
        let ConnectionState::Retrying { attempt, .. } = self.state else {
            return Vec::new();
        };
        if self.disposed {
            return Vec::new();
        }
        self.attempts = attempt;
        info!(attempt, "reconnecting");
        self.open()
    }

    /// Send a chat message.
    ///
    /// Outside [`ConnectionState::Connected`] the message is dropped and
    /// [`NOT_CONNECTED_ERROR`] is recorded.
    pub fn send(&mut self, content: &str) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(generation) = self.connected_generation() else {
            warn!("send while disconnected, message dropped");
            self.error = Some(NOT_CONNECTED_ERROR.to_string());
            return Vec::new();
        };
        match OutboundCommand::message(content).to_json() {
            Ok(text) => vec![Effect::Write { generation, text }],
            Err(e) => {
                self.error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    /// Report the user's typing state. Ignored unless connected.
    pub fn send_typing_status(&mut self, is_typing: bool) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(generation) = self.connected_generation() else {
            return Vec::new();
        };
        match OutboundCommand::typing_status(is_typing).to_json() {
            Ok(text) => vec![Effect::Write { generation, text }],
            Err(_) => Vec::new(),
        }
    }

    /// Drop the current session and start over with a fresh retry budget.
    pub fn reconnect(&mut self) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let mut effects = self.stop_session();
        self.attempts = 0;
        if self.credential.is_some() {
            info!("manual reconnect");
            effects.extend(self.open());
        } else {
            self.enter_idle();
        }
        effects
    }

    /// Dispose of the machine. Every later input is a no-op.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let effects = self.stop_session();
        self.enter_idle();
        self.disposed = true;
        info!("chat connection disposed");
        effects
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True only in [`ConnectionState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Automatic attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last recorded error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Last typing-indicator value.
    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// The conversation so far.
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Whether [`teardown`](Self::teardown) ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Build the snapshot published to observers.
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            state: self.state,
            connected: self.is_connected(),
            attempts: self.attempts,
            messages: self.log.clone(),
            is_typing: self.is_typing,
            error: self.error.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn is_current(&self, generation: u64) -> bool {
        !self.disposed && self.active == Some(generation)
    }

    fn connected_generation(&self) -> Option<u64> {
        if self.is_connected() {
            self.active
        } else {
            None
        }
    }

    fn open(&mut self) -> Vec<Effect> {
        let Some(credential) = self.credential.as_ref() else {
            return Vec::new();
        };
        self.generation += 1;
        self.active = Some(self.generation);
        self.state = ConnectionState::Connecting;
        vec![Effect::Open {
            generation: self.generation,
            url: self.endpoints.chat_socket(credential),
        }]
    }

    /// Cancel the timer and close the session, if any, with code 1000.
    fn stop_session(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelRetry];
        if let Some(generation) = self.active.take() {
            effects.push(Effect::Close {
                generation,
                code: NORMAL_CLOSURE,
            });
        }
        effects
    }

    fn enter_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.attempts = 0;
        self.is_typing = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
