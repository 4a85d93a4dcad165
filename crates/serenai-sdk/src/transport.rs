//! Transport seam between the connection driver and the socket.
//!
//! A [`Connector`] runs one transport session per call. It talks to the
//! driver only through its [`TransportLink`]: events go up tagged with the
//! session's generation, outgoing frames and the close request come down.
//!
//! [`WsConnector`] is the production implementation on top of
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::machine::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// Close code reported for a close frame that carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Something that happened on a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open.
    Opened,
    /// A text payload arrived.
    Frame(String),
    /// The session could not be started at all, e.g. an unsupported
    /// scheme. A `Closed` event follows.
    Unreachable(String),
    /// The transport failed. A `Closed` event follows.
    Error(String),
    /// The session ended.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Instruction from the driver to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Write a text frame.
    Text(String),
    /// Close the socket with this code and end the session.
    Close(u16),
}

/// A session's connection to the driver.
///
/// Dropping a link that never reported `Closed` reports
/// `Closed { code: 1006 }` on its behalf, so a session cannot end silently.
#[derive(Debug)]
pub struct TransportLink {
    generation: u64,
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    closed: bool,
}

impl TransportLink {
    /// Create a link for session `generation`.
    pub fn new(
        generation: u64,
        events: mpsc::UnboundedSender<(u64, TransportEvent)>,
        outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ) -> Self {
        Self {
            generation,
            events,
            outgoing,
            closed: false,
        }
    }

    /// Generation this session was opened with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the driver is gone.
    pub fn emit(&mut self, event: TransportEvent) -> bool {
        if matches!(event, TransportEvent::Closed { .. }) {
            self.closed = true;
        }
        self.events.send((self.generation, event)).is_ok()
    }

    /// Next instruction from the driver.
    ///
    /// `None` means the driver dropped this session and the connector
    /// should close the socket.
    pub async fn next_outgoing(&mut self) -> Option<Outgoing> {
        self.outgoing.recv().await
    }

    fn emit_failure(&mut self, failure: TransportEvent) {
        self.emit(failure);
        self.emit(TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        });
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.events.send((
                self.generation,
                TransportEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: "transport ended".into(),
                },
            ));
        }
    }
}

/// Opens transport sessions for the connection driver.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Run one session against `url` until it ends.
    ///
    /// Implementations report `Opened` once connected, every text payload
    /// as `Frame`, and finish with `Closed` unless the driver asked them to
    /// close.
    async fn run(&self, url: Url, link: TransportLink);
}

// ---------------------------------------------------------------------------
// WsConnector
// ---------------------------------------------------------------------------

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn run(&self, url: Url, mut link: TransportLink) {
        let generation = link.generation();

        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            // Only a close can arrive before the socket is open.
            _ = link.next_outgoing() => {
                debug!(generation, "session dropped while connecting");
                return;
            }
        };
        let stream = match connected {
            Ok((stream, _response)) => stream,
            Err(e @ WsError::Url(_)) => {
                link.emit_failure(TransportEvent::Unreachable(e.to_string()));
                return;
            }
            Err(e) => {
                link.emit_failure(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        link.emit(TransportEvent::Opened);
        let (mut sink, mut stream) = stream.split();

        loop {
            tokio::select! {
                outgoing = link.next_outgoing() => match outgoing {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            link.emit_failure(TransportEvent::Error(e.to_string()));
                            return;
                        }
                    }
                    Some(Outgoing::Close(code)) => {
                        close(&mut sink, code).await;
                        debug!(generation, code, "session closed by driver");
                        return;
                    }
                    None => {
                        close(&mut sink, NORMAL_CLOSURE).await;
                        return;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !link.emit(TransportEvent::Frame(text.as_str().to_owned())) {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        link.emit(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        link.emit_failure(TransportEvent::Error(e.to_string()));
                        return;
                    }
                    None => {
                        link.emit(TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        });
                        return;
                    }
                },
            }
        }
    }
}

async fn close<S>(sink: &mut S, code: u16)
where
    S: futures::Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: String::new().into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn link(generation: u64) -> (
        TransportLink,
        mpsc::UnboundedReceiver<(u64, TransportEvent)>,
        mpsc::UnboundedSender<Outgoing>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (TransportLink::new(generation, events_tx, out_rx), events_rx, out_tx)
    }

    #[test]
    fn events_are_tagged_with_generation() {
        let (mut link, mut events, _out) = link(7);
        assert!(link.emit(TransportEvent::Opened));
        assert_eq!(events.try_recv().unwrap(), (7, TransportEvent::Opened));
    }

    #[test]
    fn dropping_an_open_link_reports_abnormal_close() {
        let (link, mut events, _out) = link(3);
        drop(link);
        match events.try_recv().unwrap() {
            (3, TransportEvent::Closed { code, .. }) => assert_eq!(code, ABNORMAL_CLOSURE),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn dropping_a_closed_link_reports_nothing_more() {
        let (mut link, mut events, _out) = link(1);
        link.emit(TransportEvent::Closed {
            code: 1000,
            reason: String::new(),
        });
        drop(link);
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn handshake_failure_reports_error_then_abnormal_close() {
        // Nothing listens on port 1.
        let (link, mut events, _out) = link(1);
        let url = Url::parse("ws://127.0.0.1:1/ws/chat?token=t").unwrap();
        WsConnector.run(url, link).await;

        assert!(matches!(events.recv().await, Some((1, TransportEvent::Error(_)))));
        assert_eq!(
            events.recv().await,
            Some((
                1,
                TransportEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new()
                }
            ))
        );
    }

    #[tokio::test]
    async fn unsupported_scheme_is_unreachable() {
        let (link, mut events, _out) = link(2);
        let url = Url::parse("http://127.0.0.1/ws/chat?token=t").unwrap();
        WsConnector.run(url, link).await;

        assert!(matches!(
            events.recv().await,
            Some((2, TransportEvent::Unreachable(_)))
        ));
        assert!(matches!(
            events.recv().await,
            Some((2, TransportEvent::Closed { code: ABNORMAL_CLOSURE, .. }))
        ));
    }

    #[tokio::test]
    async fn wss_sessions_start_a_tls_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            socket.read_exact(&mut first).await.unwrap();
            first[0]
        });

        let (link, mut events, _out) = link(4);
        let url = Url::parse(&format!("wss://127.0.0.1:{port}/ws/chat?token=t")).unwrap();
        WsConnector.run(url, link).await;

        // 0x16 is the TLS handshake record type.
        assert_eq!(server.await.unwrap(), 0x16);
        assert!(matches!(events.recv().await, Some((4, TransportEvent::Error(_)))));
    }
}
