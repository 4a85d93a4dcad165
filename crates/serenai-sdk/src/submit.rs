//! Message submission as the chat page does it.
//!
//! Realtime first, HTTP when the socket is down. A message submitted over
//! HTTP is not deduplicated against the realtime channel: if the server
//! also echoes it there it appears once per delivery.

use serde_json::Value;
use tracing::info;

use crate::api::ChatApi;
use crate::connection::ChatHandle;
use crate::credentials::Credential;
use crate::error::SdkError;

/// How [`submit`] delivered the input.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Written to the realtime channel.
    Realtime,
    /// Posted to the REST API; carries the response body.
    HttpFallback(Value),
    /// Blank input, nothing sent.
    Ignored,
}

/// Submit one line of user input.
///
/// Input that is empty after trimming is ignored. Otherwise it goes over
/// the realtime channel when connected and to [`ChatApi::post_message`]
/// when not.
///
/// # Errors
///
/// * [`SdkError::Unauthenticated`] if the fallback is needed and there is
///   no credential.
/// * Any error of [`ChatApi::post_message`] or [`ChatHandle::send`].
pub async fn submit(
    chat: &ChatHandle,
    api: &ChatApi,
    credential: Option<&Credential>,
    input: &str,
) -> Result<Submission, SdkError> {
    if input.trim().is_empty() {
        return Ok(Submission::Ignored);
    }

    if chat.is_connected() {
        chat.send(input)?;
        return Ok(Submission::Realtime);
    }

    let credential = credential.ok_or(SdkError::Unauthenticated)?;
    info!("chat socket down, sending over HTTP");
    let body = api.post_message(credential, input).await?;
    Ok(Submission::HttpFallback(body))
}
