//! Chat Transport Traits
//!
//! A transport sends one user message plus its history to the chat backend
//! and hands back the response as a lazy stream of byte chunks. One call is
//! one request; transports never retry.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::messages::ChatRequest;

/// Forward-only, non-restartable stream of response chunks
///
/// End of stream is completion; there is no sentinel chunk.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Broad class of a transport failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request could not be completed (network, status, cancel, deadline)
    Network,
    /// The response body was missing or broke while being read
    Stream,
}

/// Errors from sending a request or reading its response
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never got a response
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// The response has no readable body
    #[error("no readable response stream: {0}")]
    StreamUnavailable(String),

    /// Reading the next chunk failed
    #[error("response stream failed: {0}")]
    Stream(String),

    /// The cycle was cancelled
    #[error("cancelled")]
    Cancelled,

    /// The response deadline passed
    #[error("timed out after {after:?}")]
    TimedOut {
        /// The configured deadline
        after: Duration,
    },
}

impl TransportError {
    /// Classify the failure
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Request(_) | Self::Status { .. } | Self::Cancelled | Self::TimedOut { .. } => {
                TransportErrorKind::Network
            }
            Self::StreamUnavailable(_) | Self::Stream(_) => TransportErrorKind::Stream,
        }
    }
}

/// Chat backend transport
///
/// Implement this trait to reach the backend in a new way (HTTP, in-process,
/// recorded sessions, ...).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs (e.g., "HTTP")
    fn name(&self) -> &str;

    /// Send a request and open its response stream
    ///
    /// Implementations must stop waiting and return
    /// [`TransportError::Cancelled`] once `cancel` fires.
    async fn send(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError>;
}
