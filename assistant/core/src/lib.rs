//! Assistant Core - Streaming Chat Response Aggregation
//!
//! This crate turns a chat backend's streamed reply into live UI state and a
//! finalized conversation history, independent of any UI framework. It can
//! drive a terminal, a web view, a desktop shell, or run headless in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   Surfaces (input + rendering)                    │
//! │        committed text ──►              ◄── ChatEvent / snapshots  │
//! └───────────────┬──────────────────────────────────▲───────────────┘
//!                 │                                  │
//! ┌───────────────┼──────────────────────────────────┼───────────────┐
//! │               ▼          ASSISTANT CORE          │               │
//! │  ┌───────────────────────────────────────────────┴─────────────┐ │
//! │  │                     ChatController                           │ │
//! │  │   IDLE → SUBMITTED → STREAMING → COMPLETED | FAILED → IDLE   │ │
//! │  └──────┬───────────────────┬──────────────────────┬───────────┘ │
//! │         ▼                   ▼                      ▼             │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌──────────────────┐   │
//! │  │ChatTransport│   │Utf8StreamDecoder │   │ConversationStore │   │
//! │  │ (HTTP, mem) │   │ + ResponseCycle  │   │messages, history │   │
//! │  └─────────────┘   └──────────────────┘   └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatController`]: runs one request/response cycle at a time
//! - [`ChatTransport`]: sends a request, returns a stream of byte chunks
//! - [`Utf8StreamDecoder`]: decodes chunks without splitting characters
//! - [`ConversationStore`]: the transcript and the history pairs
//! - [`ChatEvent`]: live notifications for renderers
//!
//! # Quick Start
//!
//! ```ignore
//! use assistant_core::{ChatConfig, ChatController, HttpTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ChatConfig::load(None)?;
//!     let transport = HttpTransport::from_config(&config)?;
//!     let mut controller = ChatController::new(transport, config);
//!     let mut events = controller.subscribe();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             // Render the event
//!         }
//!     });
//!
//!     controller.submit("What's on my calendar today?").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: layered configuration (defaults, TOML file, environment)
//! - [`controller`]: the request/response state machine
//! - [`messages`]: data model and wire format
//! - [`store`]: conversation state
//! - [`streaming`]: incremental decoding and the per-cycle record
//! - [`transport`]: chat backend access (HTTP, in-memory)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod messages;
pub mod store;
pub mod streaming;
pub mod transport;

pub use config::{
    default_config_path, load_config_from_path, ChatConfig, ChatConfigFile, ConfigError,
    CHAT_ENDPOINT, DEFAULT_BASE_URL,
};
pub use controller::{ChatController, CycleError, CycleOutcome, SubmitError, FAILURE_TEXT};
pub use messages::{
    ChatEvent, ChatRequest, CycleState, DisplayMessage, HistoryEntry, MessageHandle, Role,
};
pub use store::{ConversationStore, SharedStore, StoreError};
pub use streaming::{CycleStats, DecodeError, DecodeMode, ResponseCycle, Utf8StreamDecoder};
pub use transport::{
    ChatTransport, ChunkStream, HttpTransport, InMemoryTransport, ScriptedResponse,
    TransportError, TransportErrorKind,
};
