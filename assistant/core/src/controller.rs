//! Aggregation Controller
//!
//! Runs one request/response cycle at a time:
//!
//! ```text
//!   IDLE ──submit──► SUBMITTED ──stream opened──► STREAMING ──end of stream──► COMPLETED
//!                        │                          │  ▲                           │
//!                        │                          └──┘ chunk                     │
//!                        └──────────► FAILED ◄──────┘                              │
//!                                       │                                          │
//!                                       └──────────────► IDLE ◄────────────────────┘
//! ```
//!
//! - Every chunk is decoded, appended to the cycle's running text and written
//!   to the assistant message through its handle.
//! - History is committed as a USER/ASSISTANT pair only after the stream ends.
//! - Any failure appends one fixed notice and commits nothing. Failures never
//!   escape [`ChatController::submit`]; they come back as
//!   [`CycleOutcome::Failed`].
//! - A second submission while a cycle is in flight is rejected with
//!   [`SubmitError::Busy`].
//! - Cancellation and the deadline are checked at every suspension point,
//!   including event sends to a renderer that has fallen behind.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::messages::{ChatEvent, ChatRequest, CycleState, DisplayMessage, HistoryEntry, MessageHandle};
use crate::store::{ConversationStore, SharedStore, StoreError};
use crate::streaming::{DecodeError, ResponseCycle};
use crate::transport::{ChatTransport, TransportError};

/// Text shown when a cycle fails
pub const FAILURE_TEXT: &str = "Sorry, an error occurred.";

/// Why a submission was refused before any cycle started
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Nothing to send
    #[error("message is empty")]
    Empty,

    /// Another cycle is still in flight
    #[error("a response is already in progress ({state})")]
    Busy {
        /// State of the in-flight cycle
        state: CycleState,
    },
}

/// Why a cycle failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    /// Request or stream failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed response bytes
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The assistant message could not be updated
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one submitted cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The stream ended normally and history was committed
    Completed {
        /// Final assistant text
        response: String,
        /// Chunks received
        chunks: u64,
    },
    /// The cycle failed; the failure notice was appended
    Failed {
        /// What went wrong
        error: CycleError,
    },
}

impl CycleOutcome {
    /// Whether the cycle completed
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Mutable controller state, guarded together
#[derive(Debug)]
struct ControllerInner {
    state: CycleState,
    /// Cancellation for the in-flight cycle
    cancel: Option<CancellationToken>,
}

/// What can end a cycle early
#[derive(Clone, Debug)]
struct CycleBounds {
    cancel: CancellationToken,
    /// Deadline and the timeout it came from
    deadline: Option<(Instant, Duration)>,
}

impl CycleBounds {
    /// Resolve with the error for whichever bound trips first
    async fn tripped(&self) -> TransportError {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => TransportError::Cancelled,
            after = wait_for_deadline(self.deadline) => TransportError::TimedOut { after },
        }
    }
}

/// Returns the controller to IDLE however the cycle ends
///
/// If the submitting future is dropped mid-cycle the guard is still armed; it
/// then also freezes the half-filled assistant message.
struct CycleGuard<'a> {
    inner: &'a Mutex<ControllerInner>,
    store: &'a SharedStore,
    bounds: CycleBounds,
    /// Assistant message of this cycle, once created
    handle: Option<MessageHandle>,
    armed: bool,
}

impl CycleGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.bounds.cancel.cancel();
            if let Some(handle) = self.handle {
                tracing::warn!(handle = %handle, "Response cycle abandoned mid-stream");
                // Idempotent, and the handle came from this store
                let _ = self.store.write().finalize_message(handle);
            }
        }

        let mut inner = self.inner.lock();
        inner.state = CycleState::Idle;
        inner.cancel = None;
    }
}

/// Drives request/response cycles against a chat transport
pub struct ChatController<T: ChatTransport> {
    /// Configuration
    config: ChatConfig,
    /// Chat backend
    transport: Arc<T>,
    /// Transcript and history
    store: SharedStore,
    /// Lifecycle state and cancellation
    inner: Mutex<ControllerInner>,
    /// Channel to the renderer, if one subscribed
    events: Option<mpsc::Sender<ChatEvent>>,
}

impl<T: ChatTransport + 'static> ChatController<T> {
    /// Create a controller with an empty conversation
    pub fn new(transport: T, config: ChatConfig) -> Self {
        Self::with_store(Arc::new(transport), config, ConversationStore::shared())
    }

    /// Create a controller over an existing transport and store
    pub fn with_store(transport: Arc<T>, config: ChatConfig, store: SharedStore) -> Self {
        Self {
            config,
            transport,
            store,
            inner: Mutex::new(ControllerInner {
                state: CycleState::Idle,
                cancel: None,
            }),
            events: None,
        }
    }

    /// Send events to an existing channel
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Open an event channel sized by `event_buffer`
    ///
    /// Replaces any previous subscriber. The receiver should be drained while
    /// cycles run: a full channel holds the cycle back until there is room, it
    /// is cancelled, or its deadline passes. Events that would wait past
    /// either are dropped; the store stays authoritative.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        self.events = Some(tx);
        rx
    }

    /// Get configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Shared handle to the store, for renderers
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Get current state
    pub fn state(&self) -> CycleState {
        self.inner.lock().state
    }

    /// Whether a new message can be submitted
    pub fn is_idle(&self) -> bool {
        self.state() == CycleState::Idle
    }

    /// Snapshot of the transcript
    pub fn messages(&self) -> Vec<DisplayMessage> {
        self.store.read().messages().to_vec()
    }

    /// Snapshot of the history
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.store.read().history().to_vec()
    }

    /// Set the live voice transcript shown by renderers
    pub fn set_interim_transcript(&self, transcript: impl Into<String>) {
        self.store.write().set_interim_transcript(transcript);
    }

    /// The live voice transcript
    pub fn interim_transcript(&self) -> String {
        self.store.read().interim_transcript().to_string()
    }

    /// Cancel the in-flight cycle
    ///
    /// Returns `false` if nothing was in flight. The cycle then fails with
    /// [`TransportError::Cancelled`] at its next suspension point.
    pub fn cancel(&self) -> bool {
        match self.inner.lock().cancel.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Submit a user message and run its cycle to completion or failure
    ///
    /// Only refusals come back as `Err`; everything after the user message is
    /// recorded is reported through [`CycleOutcome`].
    pub async fn submit(&self, text: impl Into<String>) -> Result<CycleOutcome, SubmitError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SubmitError::Empty);
        }

        let mut guard = self.begin_cycle()?;
        let bounds = guard.bounds.clone();
        self.emit(
            ChatEvent::StateChanged {
                state: CycleState::Submitted,
            },
            &bounds,
        )
        .await;

        let (user_message, history) = {
            let mut store = self.store.write();
            let message = store.append_user_message(text.clone()).clone();
            (message, store.history().to_vec())
        };
        self.emit(
            ChatEvent::MessageAppended {
                message: user_message,
            },
            &bounds,
        )
        .await;

        tracing::info!(
            transport = self.transport.name(),
            history_len = history.len(),
            message_len = text.len(),
            "Submitting message"
        );

        let outcome = match self.run_cycle(text, history, &mut guard).await {
            Ok(cycle) => self.complete(cycle, &bounds).await,
            Err(error) => self.fail(error, guard.handle, &bounds).await,
        };

        guard.disarm();
        drop(guard);
        // Nothing can cancel the cycle any more, so never wait here
        self.try_emit(ChatEvent::StateChanged {
            state: CycleState::Idle,
        });

        Ok(outcome)
    }

    /// IDLE -> SUBMITTED, or refuse
    fn begin_cycle(&self) -> Result<CycleGuard<'_>, SubmitError> {
        let mut inner = self.inner.lock();
        if !inner.state.accepts_submission() {
            return Err(SubmitError::Busy { state: inner.state });
        }

        let cancel = CancellationToken::new();
        inner.state = CycleState::Submitted;
        inner.cancel = Some(cancel.clone());

        let deadline = self
            .config
            .response_timeout
            .map(|after| (Instant::now() + after, after));

        Ok(CycleGuard {
            inner: &self.inner,
            store: &self.store,
            bounds: CycleBounds { cancel, deadline },
            handle: None,
            armed: true,
        })
    }

    /// SUBMITTED -> STREAMING -> end of stream
    async fn run_cycle(
        &self,
        text: String,
        history: Vec<HistoryEntry>,
        guard: &mut CycleGuard<'_>,
    ) -> Result<ResponseCycle, CycleError> {
        let request = ChatRequest::new(text.clone(), history);
        let bounds = guard.bounds.clone();

        let mut stream = tokio::select! {
            biased;
            error = bounds.tripped() => return Err(error.into()),
            result = self.transport.send(&request, &bounds.cancel) => result?,
        };

        let (handle, appended) = {
            let mut store = self.store.write();
            let handle = store.begin_assistant_message();
            (handle, store.get_message(handle).cloned())
        };
        guard.handle = Some(handle);
        if let Some(message) = appended {
            self.emit(ChatEvent::MessageAppended { message }, &bounds).await;
        }
        self.set_state(CycleState::Streaming, &bounds).await;

        let mut cycle = ResponseCycle::new(text, handle, self.config.decode_mode);

        loop {
            let next = tokio::select! {
                biased;
                error = bounds.tripped() => return Err(error.into()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if cycle.apply_chunk(&chunk)? {
                        self.publish(&cycle, &bounds).await?;
                    }
                    tracing::trace!(
                        handle = %handle,
                        chunk_len = chunk.len(),
                        total_len = cycle.full().len(),
                        "Applied chunk"
                    );
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        if cycle.finish()? {
            self.publish(&cycle, &bounds).await?;
        }

        self.store.write().finalize_message(handle)?;
        self.emit(ChatEvent::MessageFinalized { handle }, &bounds).await;

        Ok(cycle)
    }

    /// Write the running text to the assistant message
    async fn publish(&self, cycle: &ResponseCycle, bounds: &CycleBounds) -> Result<(), StoreError> {
        self.store
            .write()
            .update_assistant_message(cycle.handle(), cycle.full())?;
        self.emit(
            ChatEvent::MessageUpdated {
                handle: cycle.handle(),
                text: cycle.full().to_string(),
            },
            bounds,
        )
        .await;
        Ok(())
    }

    /// STREAMING -> COMPLETED
    async fn complete(&self, cycle: ResponseCycle, bounds: &CycleBounds) -> CycleOutcome {
        let stats = cycle.stats().clone();
        let (user_text, response) = cycle.into_parts();

        let len = {
            let mut store = self.store.write();
            store.commit_history(user_text, response.clone());
            store.history().len()
        };
        self.emit(ChatEvent::HistoryCommitted { len }, bounds).await;

        tracing::debug!(
            chunks = stats.chunks_received,
            bytes = stats.bytes_received,
            response_len = response.len(),
            elapsed_ms = stats.started_at.elapsed().as_millis() as u64,
            "Response completed"
        );

        self.set_state(CycleState::Completed, bounds).await;
        CycleOutcome::Completed {
            response,
            chunks: stats.chunks_received,
        }
    }

    /// SUBMITTED | STREAMING -> FAILED
    async fn fail(
        &self,
        error: CycleError,
        handle: Option<MessageHandle>,
        bounds: &CycleBounds,
    ) -> CycleOutcome {
        tracing::error!(error = %error, streaming = handle.is_some(), "Response cycle failed");

        let notice = {
            let mut store = self.store.write();
            if let Some(handle) = handle {
                if let Err(e) = store.finalize_message(handle) {
                    tracing::warn!(error = %e, "Failed to finalize partial response");
                }
            }
            store.append_assistant_message(FAILURE_TEXT).clone()
        };

        if let Some(handle) = handle {
            self.emit(ChatEvent::MessageFinalized { handle }, bounds).await;
        }
        self.emit(ChatEvent::MessageAppended { message: notice }, bounds)
            .await;
        self.set_state(CycleState::Failed, bounds).await;

        CycleOutcome::Failed { error }
    }

    /// Set state and notify the renderer
    async fn set_state(&self, state: CycleState, bounds: &CycleBounds) {
        self.inner.lock().state = state;
        self.emit(ChatEvent::StateChanged { state }, bounds).await;
    }

    /// Send an event to the renderer, if any
    ///
    /// Waits for room in the channel only until the cycle is cancelled or
    /// times out; the event is then dropped.
    async fn emit(&self, event: ChatEvent, bounds: &CycleBounds) {
        let Some(ref tx) = self.events else {
            return;
        };

        tokio::select! {
            biased;
            sent = tx.send(event) => {
                if let Err(e) = sent {
                    tracing::warn!("Failed to send event to renderer: {}", e);
                }
            }
            error = bounds.tripped() => {
                tracing::debug!(reason = %error, "Renderer lagging, dropped event");
            }
        }
    }

    /// Send an event only if the channel has room
    fn try_emit(&self, event: ChatEvent) {
        if let Some(ref tx) = self.events {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!("Dropped event for renderer: {}", e);
            }
        }
    }
}

/// Resolve at the deadline, or never
async fn wait_for_deadline(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((at, after)) => {
            tokio::time::sleep_until(at).await;
            after
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryTransport, ScriptedResponse};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn controller(transport: InMemoryTransport) -> ChatController<InMemoryTransport> {
        ChatController::new(transport, ChatConfig::default())
    }

    fn texts(controller: &ChatController<InMemoryTransport>) -> Vec<(String, bool)> {
        controller
            .messages()
            .into_iter()
            .map(|m| (m.text, m.is_user))
            .collect()
    }

    #[tokio::test]
    async fn test_controller_creation() {
        let controller = controller(InMemoryTransport::new());
        assert_eq!(controller.state(), CycleState::Idle);
        assert!(controller.is_idle());
        assert!(controller.messages().is_empty());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn test_completed_cycle() {
        let controller = controller(
            InMemoryTransport::new().with_response(ScriptedResponse::text_chunks(["Hi ", "there!"])),
        );

        let outcome = controller.submit("Hello").await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                response: "Hi there!".to_string(),
                chunks: 2,
            }
        );
        assert_eq!(
            texts(&controller),
            vec![("Hello".to_string(), true), ("Hi there!".to_string(), false)]
        );
        assert_eq!(
            controller.history(),
            vec![HistoryEntry::user("Hello"), HistoryEntry::assistant("Hi there!")]
        );
        assert!(controller.messages().iter().all(|m| !m.streaming));
        assert!(controller.is_idle());
    }

    #[tokio::test]
    async fn test_empty_submission_rejected() {
        let controller = controller(InMemoryTransport::new());
        assert_eq!(controller.submit("").await, Err(SubmitError::Empty));
        assert_eq!(controller.submit("   \n").await, Err(SubmitError::Empty));
        assert!(controller.messages().is_empty());
        assert_eq!(controller.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_request_fails_cycle() {
        let controller = controller(InMemoryTransport::new().with_response(ScriptedResponse::Reject(
            TransportError::Request("connection refused".into()),
        )));

        let outcome = controller.submit("Hello").await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::Request(_))
            }
        ));
        assert_eq!(
            texts(&controller),
            vec![("Hello".to_string(), true), (FAILURE_TEXT.to_string(), false)]
        );
        assert!(controller.history().is_empty());
        assert!(controller.is_idle());
    }

    #[tokio::test]
    async fn test_decode_error_fails_cycle() {
        let controller = controller(InMemoryTransport::new().with_response(
            ScriptedResponse::byte_chunks([b"ok".to_vec(), vec![0xFF]]),
        ));

        let outcome = controller.submit("Hello").await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Decode(DecodeError::InvalidSequence { offset: 2, .. })
            }
        ));
        assert_eq!(
            texts(&controller),
            vec![
                ("Hello".to_string(), true),
                ("ok".to_string(), false),
                (FAILURE_TEXT.to_string(), false),
            ]
        );
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn test_busy_while_streaming() {
        let (tx, response) = ScriptedResponse::channel(4);
        let controller = Arc::new(controller(InMemoryTransport::new().with_response(response)));

        let running = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit("first").await })
        };

        tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
        while controller.messages().last().map(|m| m.text.as_str()) != Some("partial") {
            tokio::task::yield_now().await;
        }

        assert_eq!(controller.state(), CycleState::Streaming);
        assert_eq!(
            controller.submit("second").await,
            Err(SubmitError::Busy {
                state: CycleState::Streaming
            })
        );
        assert_eq!(controller.transport().request_count(), 1);

        drop(tx);
        let outcome = running.await.unwrap().unwrap();
        assert!(outcome.is_completed());
        assert_eq!(controller.history().len(), 2);
        assert!(controller.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream() {
        let (tx, response) = ScriptedResponse::channel(4);
        let controller = Arc::new(controller(InMemoryTransport::new().with_response(response)));

        let running = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit("Hello").await })
        };

        tx.send(Ok(Bytes::from_static(b"Par"))).await.unwrap();
        while controller.messages().last().map(|m| m.text.as_str()) != Some("Par") {
            tokio::task::yield_now().await;
        }
        assert!(controller.cancel());

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::Cancelled)
            }
        );
        assert_eq!(
            texts(&controller),
            vec![
                ("Hello".to_string(), true),
                ("Par".to_string(), false),
                (FAILURE_TEXT.to_string(), false),
            ]
        );
        assert!(controller.history().is_empty());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn test_deadline_while_waiting_for_response() {
        let config = ChatConfig {
            response_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let controller = ChatController::new(
            InMemoryTransport::new().with_response(ScriptedResponse::Hang),
            config,
        );

        let outcome = controller.submit("Hello").await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::TimedOut {
                    after: Duration::from_millis(20)
                })
            }
        );
        assert_eq!(
            texts(&controller),
            vec![("Hello".to_string(), true), (FAILURE_TEXT.to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_deadline_while_stream_is_silent() {
        let (tx, response) = ScriptedResponse::channel(4);
        let config = ChatConfig {
            response_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let controller =
            ChatController::new(InMemoryTransport::new().with_response(response), config);

        tx.send(Ok(Bytes::from_static(b"Partial"))).await.unwrap();
        let outcome = controller.submit("Hello").await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::TimedOut {
                    after: Duration::from_millis(50)
                })
            }
        );
        let messages = controller.messages();
        assert_eq!(
            texts(&controller),
            vec![
                ("Hello".to_string(), true),
                ("Partial".to_string(), false),
                (FAILURE_TEXT.to_string(), false),
            ]
        );
        assert!(!messages[1].streaming);
        assert!(controller.history().is_empty());
        assert!(controller.is_idle());

        // The stream never ended; only the deadline did
        drop(tx);
    }

    #[tokio::test]
    async fn test_lagging_renderer_does_not_outlive_deadline() {
        let config = ChatConfig {
            response_timeout: Some(Duration::from_millis(50)),
            event_buffer: 1,
            ..Default::default()
        };
        let mut controller = ChatController::new(
            InMemoryTransport::new().with_response(ScriptedResponse::text_chunks(["Hi ", "there!"])),
            config,
        );
        let _rx = controller.subscribe();

        let outcome = tokio::time::timeout(Duration::from_secs(1), controller.submit("Hello"))
            .await
            .expect("cycle stalled on a full event channel")
            .unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::TimedOut { .. })
            }
        ));
        assert!(controller.is_idle());
        assert!(controller.history().is_empty());
        assert_eq!(controller.messages().last().unwrap().text, FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_lagging_renderer() {
        let config = ChatConfig {
            event_buffer: 1,
            ..Default::default()
        };
        let mut controller = ChatController::new(
            InMemoryTransport::new().with_response(ScriptedResponse::text_chunks(["Hi"])),
            config,
        );
        let _rx = controller.subscribe();
        let controller = Arc::new(controller);

        let running = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit("Hello").await })
        };

        // The user message is stored before its event blocks on the full channel
        while controller.messages().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(controller.cancel());

        let outcome = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("cancel did not reach a blocked event send")
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                error: CycleError::Transport(TransportError::Cancelled)
            }
        );
        assert_eq!(controller.transport().request_count(), 0);
        assert!(controller.is_idle());
    }

    #[tokio::test]
    async fn test_events_follow_state_machine() {
        let mut controller = controller(
            InMemoryTransport::new().with_response(ScriptedResponse::text_chunks(["Hi ", "there!"])),
        );
        let mut rx = controller.subscribe();

        controller.submit("Hello").await.unwrap();
        drop(controller);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let states: Vec<CycleState> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                CycleState::Submitted,
                CycleState::Streaming,
                CycleState::Completed,
                CycleState::Idle,
            ]
        );

        let updates: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::MessageUpdated { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec!["Hi ", "Hi there!"]);

        assert!(events.contains(&ChatEvent::HistoryCommitted { len: 2 }));
    }

    #[tokio::test]
    async fn test_abandoned_submit_returns_to_idle() {
        let (tx, response) = ScriptedResponse::channel(4);
        let controller = controller(InMemoryTransport::new().with_response(response));

        tx.send(Ok(Bytes::from_static(b"half"))).await.unwrap();
        let submit = controller.submit("Hello");
        let timed_out = tokio::time::timeout(Duration::from_millis(20), submit).await;
        assert!(timed_out.is_err());

        assert!(controller.is_idle());
        let messages = controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "half");
        assert!(!messages[1].streaming);
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn test_interim_transcript_passthrough() {
        let controller = controller(InMemoryTransport::new());
        controller.set_interim_transcript("remind me to");
        assert_eq!(controller.interim_transcript(), "remind me to");
        assert!(controller.messages().is_empty());
    }
}
