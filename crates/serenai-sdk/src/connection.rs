//! Realtime chat connection manager.
//!
//! [`ChatHandle::spawn`] starts a driver task that owns a
//! [`ConnectionMachine`] and carries out its effects: spawning transport
//! sessions through a [`Connector`], writing frames, arming the retry
//! timer. Every input reaches the machine through the driver's single
//! `select!` loop, so state is only ever mutated from one place.
//!
//! Observers read [`ChatSnapshot`]s from a `watch` channel; a new snapshot
//! is published whenever an input changed something.
//!
//! ```rust,no_run
//! use serenai_sdk::{ChatConfig, ChatHandle, Credential, CredentialSource, WsConnector};
//!
//! # async fn run() -> Result<(), serenai_sdk::SdkError> {
//! let auth = CredentialSource::new(Some(Credential::new("my-token")));
//! let chat = ChatHandle::spawn(ChatConfig::from_env()?, WsConnector, auth.subscribe());
//!
//! let mut updates = chat.subscribe();
//! updates.wait_for(|s| s.connected).await.map_err(|_| serenai_sdk::SdkError::Closed)?;
//! chat.send("Hello")?;
//!
//! chat.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::credentials::Credential;
use crate::endpoints::ChatEndpoints;
use crate::error::SdkError;
use crate::machine::{ChatSnapshot, ConnectionMachine, Effect};
use crate::transport::{Connector, Outgoing, TransportEvent, TransportLink};

/// How long shutdown waits for closing sessions to finish their handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Backend URLs.
    pub endpoints: ChatEndpoints,
    /// Automatic reconnect policy.
    pub backoff: BackoffPolicy,
}

impl ChatConfig {
    /// Configuration for `endpoints` with the default backoff policy.
    pub fn new(endpoints: ChatEndpoints) -> Self {
        Self {
            endpoints,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Build the configuration from environment variables.
    ///
    /// | Variable               | Default                 | Description                    |
    /// |------------------------|-------------------------|--------------------------------|
    /// | `SERENAI_WS_URL`       | `ws://localhost:8000`   | Realtime channel base URL      |
    /// | `SERENAI_API_URL`      | `http://localhost:8000` | REST API base URL              |
    /// | `SERENAI_MAX_ATTEMPTS` | `5`                     | Automatic reconnect attempts   |
    pub fn from_env() -> Result<Self, SdkError> {
        let mut config = Self::new(ChatEndpoints::from_env()?);
        if let Ok(raw) = std::env::var("SERENAI_MAX_ATTEMPTS") {
            config.backoff.max_attempts = raw.parse().map_err(|_| {
                SdkError::Config(format!("SERENAI_MAX_ATTEMPTS must be a number, got {raw:?}"))
            })?;
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// ChatHandle
// ---------------------------------------------------------------------------

enum Command {
    Send(String),
    Typing(bool),
    Reconnect,
}

/// Handle to a running connection manager.
///
/// Dropping the handle disposes of the manager just like
/// [`shutdown`](Self::shutdown), without waiting for it.
#[derive(Debug)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ChatSnapshot>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Start a manager that follows `credentials`.
    ///
    /// Must be called within a tokio runtime. If a credential is already
    /// present the first connection attempt starts immediately.
    pub fn spawn<C: Connector>(
        config: ChatConfig,
        connector: C,
        credentials: watch::Receiver<Option<Credential>>,
    ) -> Self {
        let machine = ConnectionMachine::new(config.endpoints, config.backoff);
        let (snapshot_tx, snapshots) = watch::channel(machine.snapshot());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            machine,
            connector: Arc::new(connector),
            credentials,
            credentials_open: true,
            commands: command_rx,
            events_tx,
            events_rx,
            sessions: HashMap::new(),
            closing: Vec::new(),
            retry: None,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands,
            snapshots,
            task,
        }
    }

    /// Send a chat message over the realtime channel.
    ///
    /// When the socket is not open the message is dropped and the
    /// snapshot's `error` reads `"Not connected to chat server"`.
    ///
    /// # Errors
    ///
    /// [`SdkError::Closed`] if the manager is no longer running.
    pub fn send(&self, content: &str) -> Result<(), SdkError> {
        self.command(Command::Send(content.to_owned()))
    }

    /// Tell the server whether the user is typing. Ignored unless connected.
    pub fn send_typing_status(&self, is_typing: bool) -> Result<(), SdkError> {
        self.command(Command::Typing(is_typing))
    }

    /// Drop the current socket and connect again with a fresh retry budget.
    pub fn reconnect(&self) -> Result<(), SdkError> {
        self.command(Command::Reconnect)
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.snapshots.borrow().connected
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.clone()
    }

    /// Dispose of the manager and wait for the driver to finish.
    ///
    /// The retry timer is cancelled and an open socket is closed with code
    /// 1000. Subscribers see one last snapshot in
    /// [`ConnectionState::Idle`](crate::ConnectionState::Idle), then the
    /// channel closes.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "chat driver task failed");
        }
    }

    fn command(&self, command: Command) -> Result<(), SdkError> {
        self.commands.send(command).map_err(|_| SdkError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Session {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

enum Wake {
    Command(Option<Command>),
    Credential(Result<(), watch::error::RecvError>),
    Transport(u64, TransportEvent),
    RetryDue,
}

struct Driver<C> {
    machine: ConnectionMachine,
    connector: Arc<C>,
    credentials: watch::Receiver<Option<Credential>>,
    credentials_open: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    sessions: HashMap<u64, Session>,
    closing: Vec<JoinHandle<()>>,
    retry: Option<Pin<Box<Sleep>>>,
    snapshots: watch::Sender<ChatSnapshot>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let initial = self.credentials.borrow_and_update().clone();
        let effects = self.machine.set_credential(initial);
        self.apply(effects);
        self.publish();

        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                changed = self.credentials.changed(), if self.credentials_open => {
                    Wake::Credential(changed)
                }
                Some((generation, event)) = self.events_rx.recv() => {
                    Wake::Transport(generation, event)
                }
                () = retry_elapsed(&mut self.retry) => Wake::RetryDue,
            };

            let effects = match wake {
                Wake::Command(None) => break,
                Wake::Command(Some(Command::Send(content))) => self.machine.send(&content),
                Wake::Command(Some(Command::Typing(is_typing))) => {
                    self.machine.send_typing_status(is_typing)
                }
                Wake::Command(Some(Command::Reconnect)) => self.machine.reconnect(),
                Wake::Credential(Ok(())) => {
                    let credential = self.credentials.borrow_and_update().clone();
                    self.machine.set_credential(credential)
                }
                Wake::Credential(Err(_)) => {
                    debug!("credential source dropped, keeping last credential");
                    self.credentials_open = false;
                    Vec::new()
                }
                Wake::Transport(generation, event) => self.on_transport(generation, event),
                Wake::RetryDue => {
                    self.retry = None;
                    self.machine.retry_due()
                }
            };
            self.apply(effects);
            self.publish();
        }

        let effects = self.machine.teardown();
        self.apply(effects);
        self.publish();
        self.finish().await;
    }

    fn on_transport(&mut self, generation: u64, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Opened => self.machine.transport_opened(generation),
            TransportEvent::Frame(text) => {
                self.machine.transport_frame(generation, &text, Utc::now())
            }
            TransportEvent::Unreachable(detail) => {
                self.machine.transport_unreachable(generation, &detail)
            }
            TransportEvent::Error(detail) => self.machine.transport_error(generation, &detail),
            TransportEvent::Closed { code, reason } => {
                if let Some(session) = self.sessions.remove(&generation) {
                    self.closing.push(session.task);
                }
                self.machine.transport_closed(generation, code, &reason)
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open { generation, url } => {
                    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
                    let link = TransportLink::new(generation, self.events_tx.clone(), outgoing_rx);
                    let connector = Arc::clone(&self.connector);
                    let task = tokio::spawn(async move { connector.run(url, link).await });
                    self.sessions.insert(generation, Session { outgoing, task });
                }
                Effect::Write { generation, text } => match self.sessions.get(&generation) {
                    Some(session) => {
                        let _ = session.outgoing.send(Outgoing::Text(text));
                    }
                    None => debug!(generation, "write for a finished session dropped"),
                },
                Effect::Close { generation, code } => {
                    if let Some(session) = self.sessions.remove(&generation) {
                        let _ = session.outgoing.send(Outgoing::Close(code));
                        self.closing.push(session.task);
                    }
                }
                Effect::ScheduleRetry { delay } => {
                    self.retry = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelRetry => self.retry = None,
            }
        }
        self.closing.retain(|task| !task.is_finished());
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Give closing sessions a moment to send their close frame.
    async fn finish(mut self) {
        for (_, session) in self.sessions.drain() {
            drop(session.outgoing);
            self.closing.push(session.task);
        }
        let closing = std::mem::take(&mut self.closing);
        drop(self);

        for mut task in closing {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        debug!("chat driver stopped");
    }
}

async fn retry_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSource;
    use crate::machine::{ConnectionState, ABNORMAL_CLOSURE, NORMAL_CLOSURE, NOT_CONNECTED_ERROR};
    use async_trait::async_trait;
    use reqwest::Url;
    use tokio::time::Instant;

    /// Hands every session to the test instead of opening a socket.
    struct ScriptedConnector {
        sessions: mpsc::UnboundedSender<(Url, TransportLink)>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn run(&self, url: Url, link: TransportLink) {
            let _ = self.sessions.send((url, link));
        }
    }

    struct Harness {
        auth: CredentialSource,
        chat: ChatHandle,
        updates: watch::Receiver<ChatSnapshot>,
        sessions: mpsc::UnboundedReceiver<(Url, TransportLink)>,
    }

    impl Harness {
        fn start(credential: Option<&str>) -> Self {
            let auth = CredentialSource::new(credential.map(Credential::new));
            let (tx, sessions) = mpsc::unbounded_channel();
            let endpoints =
                ChatEndpoints::new("ws://chat.test", "http://chat.test").unwrap();
            let chat = ChatHandle::spawn(
                ChatConfig::new(endpoints),
                ScriptedConnector { sessions: tx },
                auth.subscribe(),
            );
            let updates = chat.subscribe();
            Self {
                auth,
                chat,
                updates,
                sessions,
            }
        }

        async fn next_session(&mut self) -> (Url, TransportLink) {
            self.sessions.recv().await.expect("connector dropped")
        }

        async fn wait_for(&mut self, f: impl FnMut(&ChatSnapshot) -> bool) -> ChatSnapshot {
            self.updates.wait_for(f).await.expect("driver gone").clone()
        }

        async fn connect(&mut self) -> TransportLink {
            let (_, mut link) = self.next_session().await;
            link.emit(TransportEvent::Opened);
            self.wait_for(|s| s.connected).await;
            link
        }
    }

    fn drop_with(link: &mut TransportLink, code: u16) {
        link.emit(TransportEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    #[test]
    fn config_from_env() {
        let vars = ["SERENAI_WS_URL", "SERENAI_API_URL", "SERENAI_MAX_ATTEMPTS"];
        for var in vars {
            std::env::remove_var(var);
        }

        let config = ChatConfig::from_env().unwrap();
        assert_eq!(config.endpoints.socket_base().as_str(), "ws://localhost:8000/");
        assert_eq!(config.backoff, BackoffPolicy::default());

        std::env::set_var("SERENAI_WS_URL", "wss://chat.example.com");
        std::env::set_var("SERENAI_API_URL", "https://chat.example.com");
        std::env::set_var("SERENAI_MAX_ATTEMPTS", "8");
        let config = ChatConfig::from_env().unwrap();
        assert_eq!(config.endpoints.socket_base().scheme(), "wss");
        assert_eq!(config.endpoints.api_base().host_str(), Some("chat.example.com"));
        assert_eq!(config.backoff.max_attempts, 8);

        std::env::set_var("SERENAI_MAX_ATTEMPTS", "lots");
        let err = ChatConfig::from_env().unwrap_err();
        assert!(matches!(err, SdkError::Config(ref msg) if msg.contains("\"lots\"")));

        std::env::set_var("SERENAI_MAX_ATTEMPTS", "3");
        std::env::set_var("SERENAI_WS_URL", "http://chat.example.com");
        assert!(matches!(ChatConfig::from_env(), Err(SdkError::Config(_))));

        for var in vars {
            std::env::remove_var(var);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_with_initial_credential() {
        let mut h = Harness::start(Some("tok"));
        let (url, mut link) = h.next_session().await;
        assert_eq!(url.as_str(), "ws://chat.test/ws/chat?token=tok");
        assert_eq!(h.chat.snapshot().state, ConnectionState::Connecting);

        link.emit(TransportEvent::Opened);
        let snapshot = h.wait_for(|s| s.connected).await;
        assert_eq!(snapshot.attempts, 0);
        assert!(h.chat.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_credential() {
        let mut h = Harness::start(None);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.sessions.try_recv().is_err());
        assert_eq!(h.chat.snapshot().state, ConnectionState::Idle);

        h.auth.set(Credential::new("late"));
        let (url, _link) = h.next_session().await;
        assert_eq!(url.query(), Some("token=late"));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_reach_the_snapshot() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;

        link.emit(TransportEvent::Frame(
            r#"{"type":"system_message","content":"Connected to real-time chat!"}"#.into(),
        ));
        link.emit(TransportEvent::Frame(
            r#"{"type":"typing_indicator","is_typing":true}"#.into(),
        ));
        let snapshot = h.wait_for(|s| s.is_typing).await;
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(
            snapshot.messages.last().map(|e| e.message.content.as_str()),
            Some("Connected to real-time chat!")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_writes_trimmed_frame() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;

        h.chat.send("  I feel anxious today ").unwrap();
        h.chat.send_typing_status(false).unwrap();
        assert_eq!(
            link.next_outgoing().await,
            Some(Outgoing::Text(
                r#"{"type":"message","content":"I feel anxious today"}"#.into()
            ))
        );
        assert_eq!(
            link.next_outgoing().await,
            Some(Outgoing::Text(r#"{"type":"typing_status","is_typing":false}"#.into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_connecting_records_error() {
        let mut h = Harness::start(Some("tok"));
        let (_url, _link) = h.next_session().await;
        h.chat.send("hello?").unwrap();
        let snapshot = h.wait_for(|s| s.error.is_some()).await;
        assert_eq!(snapshot.error.as_deref(), Some(NOT_CONNECTED_ERROR));
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_then_gives_up() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;

        for expected_ms in [1000, 2000, 4000, 8000, 16000] {
            drop_with(&mut link, ABNORMAL_CLOSURE);
            let started = Instant::now();
            let (_, next) = h.next_session().await;
            let elapsed = started.elapsed();
            let expected = Duration::from_millis(expected_ms);
            assert!(
                elapsed >= expected && elapsed < expected + Duration::from_millis(50),
                "expected ~{expected:?}, waited {elapsed:?}"
            );
            link = next;
        }

        drop_with(&mut link, ABNORMAL_CLOSURE);
        let snapshot = h.wait_for(|s| s.state == ConnectionState::GaveUp).await;
        assert_eq!(snapshot.attempts, 5);
        assert!(snapshot.error.is_some());

        // Nothing else is attempted on its own.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(h.sessions.try_recv().is_err());

        // A manual reconnect starts over at once.
        h.chat.reconnect().unwrap();
        let started = Instant::now();
        let (_, mut link) = h.next_session().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        link.emit(TransportEvent::Opened);
        let snapshot = h.wait_for(|s| s.connected).await;
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_close_is_not_retried() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        drop_with(&mut link, NORMAL_CLOSURE);
        h.wait_for(|s| s.state == ConnectionState::Closed).await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(h.sessions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_cancels_pending_retry() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        drop_with(&mut link, ABNORMAL_CLOSURE);
        h.wait_for(|s| matches!(s.state, ConnectionState::Retrying { .. }))
            .await;

        h.chat.reconnect().unwrap();
        let (_, _fresh) = h.next_session().await;

        // The old 1s timer must not start a second session.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.sessions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_closes_open_socket() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        h.chat.reconnect().unwrap();
        assert_eq!(link.next_outgoing().await, Some(Outgoing::Close(NORMAL_CLOSURE)));
        let (_, _fresh) = h.next_session().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_goes_idle_and_closes() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        link.emit(TransportEvent::Frame(
            r#"{"type":"system_message","content":"hi"}"#.into(),
        ));
        h.wait_for(|s| !s.messages.is_empty()).await;

        h.auth.clear();
        assert_eq!(link.next_outgoing().await, Some(Outgoing::Close(NORMAL_CLOSURE)));
        let snapshot = h.wait_for(|s| s.state == ConnectionState::Idle).await;
        assert!(snapshot.messages.is_empty());
        assert!(!snapshot.is_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_during_backoff_cancels_retry() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        drop_with(&mut link, ABNORMAL_CLOSURE);
        h.wait_for(|s| matches!(s.state, ConnectionState::Retrying { .. }))
            .await;

        h.auth.clear();
        h.wait_for(|s| s.state == ConnectionState::Idle).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.sessions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_events_are_ignored() {
        let mut h = Harness::start(Some("tok"));
        let mut old = h.connect().await;
        h.chat.reconnect().unwrap();
        let (_, mut fresh) = h.next_session().await;

        old.emit(TransportEvent::Frame(
            r#"{"type":"system_message","content":"late"}"#.into(),
        ));
        drop_with(&mut old, ABNORMAL_CLOSURE);
        fresh.emit(TransportEvent::Opened);

        let snapshot = h.wait_for(|s| s.connected).await;
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_socket_and_stops_publishing() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        let Harness {
            chat, mut updates, ..
        } = h;
        updates.borrow_and_update();

        chat.shutdown().await;
        assert_eq!(link.next_outgoing().await, Some(Outgoing::Close(NORMAL_CLOSURE)));

        assert!(updates.changed().await.is_ok());
        let last = updates.borrow_and_update().clone();
        assert_eq!(last.state, ConnectionState::Idle);
        assert!(!last.connected);
        assert!(updates.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_backoff_never_retries() {
        let mut h = Harness::start(Some("tok"));
        let mut link = h.connect().await;
        drop_with(&mut link, ABNORMAL_CLOSURE);
        h.wait_for(|s| matches!(s.state, ConnectionState::Retrying { .. }))
            .await;

        let Harness {
            chat, mut sessions, ..
        } = h;
        chat.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(matches!(
            sessions.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
