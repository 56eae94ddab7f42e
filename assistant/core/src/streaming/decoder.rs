//! Incremental UTF-8 Decoder
//!
//! Decodes a byte stream chunk by chunk. A multi-byte character split across
//! two chunks is held back in a small carry-over buffer (at most 3 bytes) and
//! completed by the next chunk, so chunk boundaries never corrupt text.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Replacement character emitted for invalid input in lossy mode
const REPLACEMENT: char = '\u{FFFD}';

/// How to treat bytes that are not valid UTF-8
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Invalid input fails the stream
    #[default]
    Strict,
    /// Invalid input becomes U+FFFD, like a browser `TextDecoder`
    Lossy,
}

impl FromStr for DecodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lossy" => Ok(Self::Lossy),
            other => Err(format!("unknown decode mode '{other}' (expected strict or lossy)")),
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Lossy => f.write_str("lossy"),
        }
    }
}

/// Malformed response text
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte sequence that can never be valid UTF-8
    #[error("invalid UTF-8 sequence {bytes:02x?} at byte {offset}")]
    InvalidSequence {
        /// Offset of the sequence from the start of the stream
        offset: usize,
        /// The offending bytes
        bytes: Vec<u8>,
    },

    /// The stream ended in the middle of a multi-byte character
    #[error("stream ended inside a UTF-8 sequence ({} pending bytes)", pending.len())]
    Truncated {
        /// Bytes that never completed a character
        pending: Vec<u8>,
    },
}

/// Stateful UTF-8 decoder for one response stream
#[derive(Clone, Debug, Default)]
pub struct Utf8StreamDecoder {
    mode: DecodeMode,
    /// Undecoded tail of the previous chunk
    pending: Vec<u8>,
    /// Bytes fully decoded so far (excludes `pending`)
    decoded_bytes: usize,
}

impl Utf8StreamDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new(mode: DecodeMode) -> Self {
        Self {
            mode,
            pending: Vec::with_capacity(4),
            decoded_bytes: 0,
        }
    }

    /// The configured mode
    #[must_use]
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Bytes held back waiting for the rest of a character
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Decode the next chunk
    ///
    /// Returns all text that is complete after this chunk. Any trailing partial
    /// character is carried into the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        let base = self.decoded_bytes;
        let bytes: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));

                    match e.error_len() {
                        // Incomplete character at the end of the input
                        None => {
                            self.pending.extend_from_slice(&rest[valid..]);
                            break;
                        }
                        Some(len) => match self.mode {
                            DecodeMode::Strict => {
                                let offset = base + (bytes.len() - rest.len()) + valid;
                                return Err(DecodeError::InvalidSequence {
                                    offset,
                                    bytes: rest[valid..valid + len].to_vec(),
                                });
                            }
                            DecodeMode::Lossy => {
                                out.push(REPLACEMENT);
                                rest = &rest[valid + len..];
                            }
                        },
                    }
                }
            }
        }

        self.decoded_bytes = base + bytes.len() - self.pending.len();
        Ok(out)
    }

    /// Flush at end of stream
    ///
    /// Strict mode fails if a partial character is still pending; lossy mode
    /// turns it into a single U+FFFD.
    pub fn finish(&mut self) -> Result<String, DecodeError> {
        if self.pending.is_empty() {
            return Ok(String::new());
        }

        let pending = std::mem::take(&mut self.pending);
        self.decoded_bytes += pending.len();
        match self.mode {
            DecodeMode::Strict => Err(DecodeError::Truncated { pending }),
            DecodeMode::Lossy => Ok(REPLACEMENT.to_string()),
        }
    }
}
