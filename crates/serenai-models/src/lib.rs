#![deny(missing_docs)]

//! # SerenAI Models
//!
//! Core data types for the SerenAI realtime chat channel.
//!
//! ## Frame hierarchy
//!
//! ```text
//! server → client                      client → server
//! InboundFrame                         OutboundCommand
//! ├── Message(ChatMessage)             ├── Message { content }
//! │   └── EmotionAnalysis (opaque)     └── TypingStatus { is_typing }
//! ├── TypingIndicator { is_typing }
//! ├── SystemMessage { content }
//! └── Error { content }
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`frame`] | Inbound frames and the `ChatMessage` payload |
//! | [`emotion`] | Opaque emotion analysis attached to messages |
//! | [`outbound`] | Commands the client writes to the socket |
//! | [`conversation`] | Append-only conversation log and its entries |
//! | [`error`] | Decode and validation errors |

pub mod conversation;
pub mod emotion;
pub mod error;
pub mod frame;
pub mod outbound;

// Re-export all public types at crate root for convenience.
pub use conversation::*;
pub use emotion::*;
pub use error::*;
pub use frame::*;
pub use outbound::*;
