//! Response Cycle Record
//!
//! Everything one in-flight response owns: the message it is filling, the
//! decoder with its carry-over bytes, and the running text. The controller
//! threads a single `ResponseCycle` through the chunk loop by `&mut` instead of
//! keeping these as loose fields.

use std::time::{Duration, Instant};

use super::decoder::{DecodeError, DecodeMode, Utf8StreamDecoder};
use crate::messages::MessageHandle;

/// Statistics for one response stream
#[derive(Clone, Debug)]
pub struct CycleStats {
    /// Chunks received from the transport
    pub chunks_received: u64,
    /// Raw bytes received from the transport
    pub bytes_received: usize,
    /// When the stream opened
    pub started_at: Instant,
    /// When the first chunk arrived
    pub first_chunk_at: Option<Instant>,
}

impl CycleStats {
    fn new() -> Self {
        Self {
            chunks_received: 0,
            bytes_received: 0,
            started_at: Instant::now(),
            first_chunk_at: None,
        }
    }

    /// Time from stream open to first chunk
    #[must_use]
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.first_chunk_at.map(|t| t.duration_since(self.started_at))
    }
}

/// State of one streaming response
#[derive(Debug)]
pub struct ResponseCycle {
    user_text: String,
    handle: MessageHandle,
    decoder: Utf8StreamDecoder,
    full: String,
    stats: CycleStats,
}

impl ResponseCycle {
    /// Start a cycle for the message identified by `handle`
    #[must_use]
    pub fn new(user_text: String, handle: MessageHandle, mode: DecodeMode) -> Self {
        Self {
            user_text,
            handle,
            decoder: Utf8StreamDecoder::new(mode),
            full: String::new(),
            stats: CycleStats::new(),
        }
    }

    /// The user message this cycle answers
    #[must_use]
    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    /// The assistant message this cycle fills
    #[must_use]
    pub fn handle(&self) -> MessageHandle {
        self.handle
    }

    /// Text accumulated so far
    #[must_use]
    pub fn full(&self) -> &str {
        &self.full
    }

    /// Stream statistics
    #[must_use]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Decode a chunk and append it to the running text
    ///
    /// Returns `true` if the visible text changed. A chunk that only carries
    /// the start of a multi-byte character changes nothing yet.
    pub fn apply_chunk(&mut self, chunk: &[u8]) -> Result<bool, DecodeError> {
        self.stats.chunks_received += 1;
        self.stats.bytes_received += chunk.len();
        self.stats.first_chunk_at.get_or_insert_with(Instant::now);

        let fragment = self.decoder.decode(chunk)?;
        self.full.push_str(&fragment);
        Ok(!fragment.is_empty())
    }

    /// Flush the decoder at end of stream
    ///
    /// Returns `true` if the flush added text.
    pub fn finish(&mut self) -> Result<bool, DecodeError> {
        let tail = self.decoder.finish()?;
        self.full.push_str(&tail);
        Ok(!tail.is_empty())
    }

    /// Consume the cycle, returning the user text and final response
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.user_text, self.full)
    }
}
