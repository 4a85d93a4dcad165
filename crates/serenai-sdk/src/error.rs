//! SDK error types.
//!
//! [`SdkError`] is the single error type returned by every fallible
//! operation in the SDK. The connection manager itself never returns
//! transport failures to callers; those are reported through
//! [`ChatSnapshot::error`](crate::ChatSnapshot::error). The variants here
//! cover configuration, the HTTP fallback and a manager that has already
//! been shut down.

/// Error type for all SDK operations.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Invalid or missing configuration (e.g. bad URL, wrong scheme).
    #[error("configuration error: {0}")]
    Config(String),

    /// No bearer credential is available for an authenticated call.
    #[error("no credential available")]
    Unauthenticated,

    /// HTTP request failure (connection, TLS, body decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat API answered with a non-success status.
    #[error("chat API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The connection manager has been shut down.
    #[error("chat connection closed")]
    Closed,
}
