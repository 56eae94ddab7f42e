//! In-Memory Transport
//!
//! Replays scripted responses without any network. Each `send` records the
//! request and consumes the next scripted response in order. Useful for
//! headless runs, demos and tests.
//!
//! # Example
//!
//! ```ignore
//! use assistant_core::transport::{InMemoryTransport, ScriptedResponse};
//!
//! let transport = InMemoryTransport::new()
//!     .with_response(ScriptedResponse::text_chunks(["Hi ", "there!"]));
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::traits::{ChatTransport, ChunkStream, TransportError};
use crate::messages::ChatRequest;

/// One scripted reply
#[derive(Debug)]
pub enum ScriptedResponse {
    /// Fail the request itself
    Reject(TransportError),
    /// Open a stream that yields these items, then ends
    Chunks(Vec<Result<Bytes, TransportError>>),
    /// Open a stream fed from a channel; it ends when the sender drops
    Channel(mpsc::Receiver<Result<Bytes, TransportError>>),
    /// Never answer; the request resolves only on cancellation
    Hang,
}

impl ScriptedResponse {
    /// A stream of UTF-8 text chunks
    pub fn text_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from(chunk.into())))
                .collect(),
        )
    }

    /// A stream of raw byte chunks
    pub fn byte_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::Chunks(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))).collect())
    }

    /// Text chunks followed by a mid-stream failure
    pub fn fail_after<I, S>(chunks: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<_> = chunks
            .into_iter()
            .map(|chunk| Ok(Bytes::from(chunk.into())))
            .collect();
        items.push(Err(error));
        Self::Chunks(items)
    }

    /// A paced stream and the sender that drives it
    #[must_use]
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Bytes, TransportError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::Channel(rx))
    }
}

/// Transport that replays scripted responses
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl InMemoryTransport {
    /// Create a transport with no scripted responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response (builder style)
    #[must_use]
    pub fn with_response(self, response: ScriptedResponse) -> Self {
        self.push_response(response);
        self
    }

    /// Queue a response
    pub fn push_response(&self, response: ScriptedResponse) {
        self.responses.lock().push_back(response);
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl ChatTransport for InMemoryTransport {
    fn name(&self) -> &str {
        "InMemory"
    }

    async fn send(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        self.requests.lock().push(request.clone());
        let response = self.responses.lock().pop_front();

        match response {
            Some(ScriptedResponse::Reject(error)) => Err(error),
            Some(ScriptedResponse::Chunks(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(ScriptedResponse::Channel(rx)) => Ok(ReceiverStream::new(rx).boxed()),
            Some(ScriptedResponse::Hang) => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
            None => Err(TransportError::StreamUnavailable(
                "no scripted response left".to_string(),
            )),
        }
    }
}
