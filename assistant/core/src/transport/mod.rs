//! Chat Backend Transport
//!
//! Abstracted access to the chat backend through a common trait.
//!
//! # Available Transports
//!
//! - **HTTP**: POST to `{base_url}/api/chat`, streamed body (default)
//! - **InMemory**: scripted responses for headless runs and tests
//!
//! # Usage
//!
//! ```ignore
//! use assistant_core::transport::{ChatTransport, HttpTransport};
//! use assistant_core::{ChatConfig, ChatRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = HttpTransport::from_config(&ChatConfig::from_env())?;
//! let stream = transport
//!     .send(&ChatRequest::new("Hello", Vec::new()), &CancellationToken::new())
//!     .await?;
//! ```

mod http;
mod in_memory;
mod traits;

pub use http::HttpTransport;
pub use in_memory::{InMemoryTransport, ScriptedResponse};
pub use traits::{ChatTransport, ChunkStream, TransportError, TransportErrorKind};
