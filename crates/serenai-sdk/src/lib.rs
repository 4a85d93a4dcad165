//! # SerenAI SDK
//!
//! Client-side connection manager for the **SerenAI** realtime chat
//! channel.
//!
//! The SDK provides:
//!
//! * [`ChatHandle`] — the connection manager: connects while a credential
//!   is present, reconnects with exponential backoff, keeps the
//!   conversation log and publishes [`ChatSnapshot`]s.
//! * [`ConnectionMachine`] — the pure state machine behind it.
//! * [`Connector`] / [`WsConnector`] — the transport seam and its
//!   `tokio-tungstenite` implementation.
//! * [`CredentialSource`] — injectable bearer credential.
//! * [`ChatEndpoints`] — canonical backend URLs.
//! * [`ChatApi`] and [`submit`] — HTTP fallback for sending while the
//!   socket is down.
//! * [`SdkError`] — unified error type for all SDK operations.
//!
//! Wire types from [`serenai_models`] are re-exported for convenience.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use serenai_sdk::{ChatConfig, ChatHandle, Credential, CredentialSource, WsConnector};
//!
//! # async fn run() -> Result<(), serenai_sdk::SdkError> {
//! let auth = CredentialSource::new(Some(Credential::new("my-token")));
//! let chat = ChatHandle::spawn(ChatConfig::from_env()?, WsConnector, auth.subscribe());
//!
//! let mut updates = chat.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     for message in snapshot.messages.messages() {
//!         println!("{}", message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backoff;
pub mod connection;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod machine;
pub mod submit;
pub mod transport;

pub use api::ChatApi;
pub use backoff::BackoffPolicy;
pub use connection::{ChatConfig, ChatHandle};
pub use credentials::{Credential, CredentialSource};
pub use endpoints::ChatEndpoints;
pub use error::SdkError;
pub use machine::{ChatSnapshot, ConnectionMachine, ConnectionState, Effect};
pub use submit::{submit, Submission};
pub use transport::{Connector, Outgoing, TransportEvent, TransportLink, WsConnector};

// Re-export wire types from serenai-models for ergonomic usage.
pub use serenai_models::{
    ChatMessage, ConversationLog, EmotionAnalysis, EntryKind, InboundFrame, LogEntry,
    OutboundCommand,
};
