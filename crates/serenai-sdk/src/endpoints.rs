//! Canonical endpoint URLs for the SerenAI chat backend.
//!
//! All URLs the SDK talks to are built through [`ChatEndpoints`] so the
//! path layout lives in one place.
//!
//! # Layout
//!
//! ```text
//! {socket_base}/ws/chat?token={bearer}   ← realtime channel
//! {api_base}/api/chat/message            ← HTTP fallback for sends
//! ```

use reqwest::Url;

use crate::credentials::Credential;
use crate::error::SdkError;

/// Default base URL of the realtime channel.
pub const DEFAULT_SOCKET_BASE: &str = "ws://localhost:8000";
/// Default base URL of the REST API.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Base URLs of the chat backend.
///
/// # Examples
///
/// ```
/// use serenai_sdk::{ChatEndpoints, Credential};
///
/// let endpoints = ChatEndpoints::new("wss://chat.example.com", "https://chat.example.com").unwrap();
/// assert_eq!(
///     endpoints.chat_socket(&Credential::new("abc")).as_str(),
///     "wss://chat.example.com/ws/chat?token=abc",
/// );
/// assert_eq!(
///     endpoints.chat_message().as_str(),
///     "https://chat.example.com/api/chat/message",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEndpoints {
    socket_base: Url,
    api_base: Url,
}

impl ChatEndpoints {
    /// Parse and validate both base URLs.
    ///
    /// The socket base must use `ws` or `wss`, the API base `http` or
    /// `https`. A path prefix on either base is preserved.
    pub fn new(socket_base: &str, api_base: &str) -> Result<Self, SdkError> {
        Ok(Self {
            socket_base: parse_base(socket_base, &["ws", "wss"])?,
            api_base: parse_base(api_base, &["http", "https"])?,
        })
    }

    /// Build from `SERENAI_WS_URL` / `SERENAI_API_URL`, falling back to
    /// [`DEFAULT_SOCKET_BASE`] and [`DEFAULT_API_BASE`].
    pub fn from_env() -> Result<Self, SdkError> {
        let socket_base = std::env::var("SERENAI_WS_URL")
            .unwrap_or_else(|_| DEFAULT_SOCKET_BASE.to_string());
        let api_base =
            std::env::var("SERENAI_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(&socket_base, &api_base)
    }

    /// Realtime channel URL for one connection attempt.
    ///
    /// The credential travels as the `token` query parameter and is fixed
    /// for the lifetime of the connection.
    pub fn chat_socket(&self, credential: &Credential) -> Url {
        let mut url = with_segments(&self.socket_base, &["ws", "chat"]);
        url.query_pairs_mut().append_pair("token", credential.bearer());
        url
    }

    /// HTTP fallback endpoint for submitting a chat message.
    pub fn chat_message(&self) -> Url {
        with_segments(&self.api_base, &["api", "chat", "message"])
    }

    /// The configured socket base.
    pub fn socket_base(&self) -> &Url {
        &self.socket_base
    }

    /// The configured API base.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }
}

fn parse_base(raw: &str, schemes: &[&str]) -> Result<Url, SdkError> {
    let url = Url::parse(raw).map_err(|e| SdkError::Config(format!("invalid URL {raw:?}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(SdkError::Config(format!(
            "URL {raw:?} must use one of {schemes:?}"
        )));
    }
    if url.cannot_be_a_base() {
        return Err(SdkError::Config(format!("URL {raw:?} cannot be used as a base")));
    }
    Ok(url)
}

fn with_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
