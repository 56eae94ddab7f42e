//! Conversation Messages
//!
//! The data model shared by the store, the controller and renderers:
//!
//! - [`DisplayMessage`]: one rendered bubble in the transcript
//! - [`HistoryEntry`]: one finalized turn sent back to the backend as context
//! - [`ChatRequest`]: the outbound request body
//! - [`ChatEvent`]: live notifications emitted while a cycle runs
//!
//! # Wire Format
//!
//! ```text
//! POST /api/chat
//! { "message": "...", "chatHistory": [ { "role": "USER" | "CHATBOT", "message": "..." } ] }
//! ```
//!
//! The assistant side is modeled as [`Role::Assistant`] but travels as
//! `"CHATBOT"` on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a display message
///
/// Handles are assigned by the store in increasing order and never reused, so a
/// streaming cycle can always find the exact bubble it created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub u64);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// One rendered bubble in the transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    /// Store-assigned handle
    pub handle: MessageHandle,
    /// Text shown to the user
    pub text: String,
    /// Whether the user authored this message
    pub is_user: bool,
    /// Whether the text is still being filled by a live stream
    pub streaming: bool,
    /// When the message was created (Unix timestamp ms)
    pub timestamp: i64,
}

impl DisplayMessage {
    /// A finished user message
    pub fn user(handle: MessageHandle, text: String) -> Self {
        Self {
            handle,
            text,
            is_user: true,
            streaming: false,
            timestamp: now_ms(),
        }
    }

    /// An empty assistant message that a stream will fill
    pub fn streaming_assistant(handle: MessageHandle) -> Self {
        Self {
            handle,
            text: String::new(),
            is_user: false,
            streaming: true,
            timestamp: now_ms(),
        }
    }

    /// A finished assistant-side message (e.g. the failure notice)
    pub fn assistant(handle: MessageHandle, text: String) -> Self {
        Self {
            handle,
            text,
            is_user: false,
            streaming: false,
            timestamp: now_ms(),
        }
    }
}

/// Who authored a history entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The person typing or speaking
    #[serde(rename = "USER")]
    User,
    /// The chat backend
    #[serde(rename = "CHATBOT")]
    Assistant,
}

impl Role {
    /// Label used on the wire
    #[must_use]
    pub fn wire_label(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "CHATBOT",
        }
    }
}

/// One finalized turn of conversation context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author of the turn
    pub role: Role,
    /// Complete text of the turn
    pub message: String,
}

impl HistoryEntry {
    /// A user turn
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
        }
    }

    /// An assistant turn
    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            message: message.into(),
        }
    }
}

/// Outbound request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The new user message
    pub message: String,
    /// Every finalized turn before this one, oldest first
    pub chat_history: Vec<HistoryEntry>,
}

impl ChatRequest {
    /// Build a request from a message and a history snapshot
    pub fn new(message: impl Into<String>, chat_history: Vec<HistoryEntry>) -> Self {
        Self {
            message: message.into(),
            chat_history,
        }
    }
}

/// Controller lifecycle state for one response cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    /// Ready for the next user message
    Idle,
    /// User message recorded, waiting for the response stream
    Submitted,
    /// Response stream open, chunks being applied
    Streaming,
    /// Stream ended and history was committed
    Completed,
    /// The cycle failed and the failure notice was shown
    Failed,
}

impl CycleState {
    /// Whether a new submission may start from this state
    #[must_use]
    pub fn accepts_submission(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Submitted => "submitted",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Notifications sent to renderers while the controller works
///
/// Every store mutation has a matching event, in the order it was applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A message was appended to the transcript
    MessageAppended {
        /// The message as appended
        message: DisplayMessage,
    },
    /// A streaming assistant message received new text
    MessageUpdated {
        /// Which message changed
        handle: MessageHandle,
        /// The full text so far (not a delta)
        text: String,
    },
    /// A streaming message stopped changing
    MessageFinalized {
        /// Which message was finalized
        handle: MessageHandle,
    },
    /// A USER/ASSISTANT pair was committed to history
    HistoryCommitted {
        /// History length after the commit
        len: usize,
    },
    /// The controller changed state
    StateChanged {
        /// The new state
        state: CycleState,
    },
}

/// Get current timestamp in milliseconds
fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
