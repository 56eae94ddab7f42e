//! Conversation State Store
//!
//! Owns the two ordered sequences of a conversation:
//!
//! - `messages`: every bubble shown to the user, in conversation order
//! - `history`: finalized USER/ASSISTANT pairs sent to the backend as context
//!
//! # Invariants
//!
//! - Messages are append-only. Only an assistant message that is still
//!   `streaming` may change, and only through its own [`MessageHandle`].
//! - History is append-only and grows by whole pairs, so its length is always
//!   even.
//!
//! The store is plain data; [`SharedStore`] wraps it in a lock so renderers can
//! read snapshots while a cycle writes.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::messages::{DisplayMessage, HistoryEntry, MessageHandle};

/// A store shared between the controller and readers
pub type SharedStore = Arc<RwLock<ConversationStore>>;

/// Errors from store mutations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No message carries this handle
    #[error("no message with handle {0}")]
    UnknownHandle(MessageHandle),

    /// The message exists but is no longer streaming
    #[error("message {0} is finalized and can no longer change")]
    Finalized(MessageHandle),
}

/// Ordered transcript and context history for one conversation
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    /// Transcript, in insertion order
    messages: Vec<DisplayMessage>,
    /// Context pairs, in insertion order
    history: Vec<HistoryEntry>,
    /// Next handle to assign
    next_handle: u64,
    /// Live voice transcript, passed through to renderers untouched
    interim_transcript: String,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind a shared lock
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    fn allocate_handle(&mut self) -> MessageHandle {
        let handle = MessageHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Append a finished user message
    pub fn append_user_message(&mut self, text: impl Into<String>) -> &DisplayMessage {
        let handle = self.allocate_handle();
        self.push(DisplayMessage::user(handle, text.into()))
    }

    /// Append an empty assistant message and return its handle
    ///
    /// The message stays mutable through [`update_assistant_message`] until
    /// [`finalize_message`] is called with the same handle.
    ///
    /// [`update_assistant_message`]: Self::update_assistant_message
    /// [`finalize_message`]: Self::finalize_message
    pub fn begin_assistant_message(&mut self) -> MessageHandle {
        let handle = self.allocate_handle();
        self.push(DisplayMessage::streaming_assistant(handle));
        handle
    }

    /// Append a finished assistant-side message, such as a failure notice
    pub fn append_assistant_message(&mut self, text: impl Into<String>) -> &DisplayMessage {
        let handle = self.allocate_handle();
        self.push(DisplayMessage::assistant(handle, text.into()))
    }

    /// Replace the text of the streaming message identified by `handle`
    pub fn update_assistant_message(
        &mut self,
        handle: MessageHandle,
        full_text: &str,
    ) -> Result<(), StoreError> {
        let msg = self.live_message_mut(handle)?;
        msg.text.clear();
        msg.text.push_str(full_text);
        Ok(())
    }

    /// Stop a streaming message from changing
    ///
    /// Finalizing an already-finalized message is a no-op.
    pub fn finalize_message(&mut self, handle: MessageHandle) -> Result<(), StoreError> {
        let msg = self.message_mut(handle)?;
        msg.streaming = false;
        Ok(())
    }

    /// Append a USER/ASSISTANT pair to history
    pub fn commit_history(&mut self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.history.reserve(2);
        self.history.push(HistoryEntry::user(user_text));
        self.history.push(HistoryEntry::assistant(assistant_text));

        tracing::debug!(len = self.history.len(), "Committed history pair");
    }

    /// Set the live voice transcript
    pub fn set_interim_transcript(&mut self, transcript: impl Into<String>) {
        self.interim_transcript = transcript.into();
    }

    /// The live voice transcript
    pub fn interim_transcript(&self) -> &str {
        &self.interim_transcript
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    /// All history entries, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Get message by handle
    pub fn get_message(&self, handle: MessageHandle) -> Option<&DisplayMessage> {
        self.position(handle).ok().map(|idx| &self.messages[idx])
    }

    /// The most recently appended message
    pub fn last_message(&self) -> Option<&DisplayMessage> {
        self.messages.last()
    }

    /// Whether any message is still streaming
    pub fn is_streaming(&self) -> bool {
        self.messages.iter().any(|m| m.streaming)
    }

    fn push(&mut self, msg: DisplayMessage) -> &DisplayMessage {
        self.messages.push(msg);
        &self.messages[self.messages.len() - 1]
    }

    /// Handles are assigned in increasing order and messages are never removed,
    /// so the transcript is sorted by handle.
    fn position(&self, handle: MessageHandle) -> Result<usize, StoreError> {
        self.messages
            .binary_search_by_key(&handle, |m| m.handle)
            .map_err(|_| StoreError::UnknownHandle(handle))
    }

    fn message_mut(&mut self, handle: MessageHandle) -> Result<&mut DisplayMessage, StoreError> {
        let idx = self.position(handle)?;
        Ok(&mut self.messages[idx])
    }

    fn live_message_mut(&mut self, handle: MessageHandle) -> Result<&mut DisplayMessage, StoreError> {
        let msg = self.message_mut(handle)?;
        if msg.streaming {
            Ok(msg)
        } else {
            Err(StoreError::Finalized(handle))
        }
    }
}
