//! # mock-chat
//!
//! A stand-in for the SerenAI chat backend, small enough to run inside a
//! test. It speaks the same realtime protocol and REST shape:
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `GET /ws/chat?token=…` | Welcome `system_message`; each `message` gets `typing_indicator` on/off then an assistant `message` with emotion analysis; `typing_status` is echoed back |
//! | `POST /api/chat/message` | Bearer required; content 1..=1000 chars; replies with the assistant message |
//! | `GET /api/health` | Liveness probe |
//!
//! Any non-empty token is accepted. An empty token gets close code 1008.

pub mod classifier;
pub mod error;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::classifier::Analysis;
use crate::error::ApiError;

/// Text of the `system_message` sent on connect.
pub const WELCOME: &str = "Connected to real-time chat!";
/// Text of the `error` frame sent when a frame cannot be processed.
pub const PROCESSING_ERROR: &str =
    "Sorry, I encountered an error processing your message. Please try again.";
/// Longest accepted message, in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by all handlers.
#[derive(Debug)]
pub struct MockState {
    next_id: AtomicI64,
}

impl MockState {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }
}

/// Build the application router.
pub fn router() -> Router {
    Router::new()
        .route("/ws/chat", get(chat_socket))
        .route("/api/chat/message", post(post_message))
        .route("/api/health", get(health))
        .with_state(Arc::new(MockState::default()))
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SocketParams {
    #[serde(default)]
    token: String,
}

/// Body of `POST /api/chat/message`.
#[derive(Deserialize)]
struct ChatCreate {
    content: String,
}

/// Assistant message, as returned by the REST API and pushed on the socket.
#[derive(Serialize)]
struct ChatResponse {
    id: i64,
    content: String,
    is_user: bool,
    timestamp: String,
    emotion_analysis: Analysis,
}

impl ChatResponse {
    fn answer(state: &MockState, message: &str) -> Self {
        let analysis = classifier::analyze(message);
        Self {
            id: state.next_id(),
            content: classifier::reply(message, &analysis),
            is_user: false,
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            emotion_analysis: analysis,
        }
    }
}

// ---------------------------------------------------------------------------
// REST handlers
// ---------------------------------------------------------------------------

/// `POST /api/chat/message` — answer a message without the socket.
async fn post_message(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(req): Json<ChatCreate>,
) -> Result<Json<ChatResponse>, ApiError> {
    bearer(&headers).ok_or(ApiError::Unauthorized)?;
    let content = validate_content(&req.content)?;
    info!(chars = content.chars().count(), "message received over HTTP");
    Ok(Json(ChatResponse::answer(&state, content)))
}

/// `GET /api/health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn validate_content(raw: &str) -> Result<&str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("Message content cannot be empty".into()));
    }
    if raw.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::Validation(format!(
            "Message content too long (max {MAX_CONTENT_CHARS} characters)"
        )));
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Realtime channel
// ---------------------------------------------------------------------------

/// `GET /ws/chat?token=…` — upgrade to the realtime channel.
async fn chat_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<MockState>>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, params.token, state))
}

async fn run_session(mut socket: WebSocket, token: String, state: Arc<MockState>) {
    if token.trim().is_empty() {
        warn!("rejecting socket without token");
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason: String::from("Invalid token").into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    }

    info!("chat client connected");
    if send_json(&mut socket, &json!({ "type": "system_message", "content": WELCOME }))
        .await
        .is_err()
    {
        return;
    }

    while let Some(incoming) = socket.recv().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        if handle_frame(&mut socket, &state, text.as_str()).await.is_err() {
            break;
        }
    }
    info!("chat client disconnected");
}

/// React to one client frame. `Err` means the socket is gone.
async fn handle_frame(
    socket: &mut WebSocket,
    state: &MockState,
    text: &str,
) -> Result<(), axum::Error> {
    let Ok(data) = serde_json::from_str::<Value>(text) else {
        debug!("undecodable client frame");
        return send_json(socket, &json!({ "type": "error", "content": PROCESSING_ERROR })).await;
    };

    match data.get("type").and_then(Value::as_str).unwrap_or("message") {
        "message" => {
            let content = data.get("content").and_then(Value::as_str).unwrap_or("");
            send_json(socket, &json!({ "type": "typing_indicator", "is_typing": true })).await?;
            let answer = ChatResponse::answer(state, content);
            send_json(socket, &json!({ "type": "typing_indicator", "is_typing": false })).await?;

            let mut frame = serde_json::to_value(&answer).unwrap_or_default();
            if let Value::Object(fields) = &mut frame {
                fields.insert("type".into(), "message".into());
            }
            send_json(socket, &frame).await
        }
        "typing_status" => {
            let is_typing = data.get("is_typing").and_then(Value::as_bool).unwrap_or(false);
            send_json(
                socket,
                &json!({ "type": "typing_status", "user_id": 1, "is_typing": is_typing }),
            )
            .await
        }
        other => {
            debug!(frame_type = other, "ignoring client frame");
            Ok(())
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
