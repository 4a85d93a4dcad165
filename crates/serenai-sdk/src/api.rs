//! HTTP fallback for sending chat messages.
//!
//! When the realtime channel is down the chat page posts the message to
//! the REST API instead. The assistant's reply is still expected on the
//! realtime channel once it comes back, so the response body is handed
//! back to the caller as-is and never added to the conversation log.

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::credentials::Credential;
use crate::endpoints::ChatEndpoints;
use crate::error::SdkError;

/// Client for the chat REST API.
#[derive(Debug, Clone)]
pub struct ChatApi {
    http: reqwest::Client,
    endpoints: ChatEndpoints,
}

impl ChatApi {
    /// Client for the API behind `endpoints`.
    pub fn new(endpoints: ChatEndpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    /// Reuse an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, endpoints: ChatEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// `POST /api/chat/message` with `{"content": ...}`.
    ///
    /// # Errors
    ///
    /// * [`SdkError::Http`] if the request could not be made or the body is
    ///   not JSON.
    /// * [`SdkError::Api`] if the server answered with a non-success status.
    pub async fn post_message(
        &self,
        credential: &Credential,
        content: &str,
    ) -> Result<Value, SdkError> {
        let url = self.endpoints.chat_message();
        debug!(%url, "posting chat message over HTTP");

        let res = self
            .http
            .post(url)
            .bearer_auth(credential.bearer())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await?;
            warn!(status = status.as_u16(), "chat API rejected message");
            return Err(SdkError::Api {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(res.json().await?)
    }
}
