//! Asynchronous operation objects.
//!
//! An [`AsyncOp`] is allocated by the caller, posted to a socket, executed on
//! the socket's runtime and completed exactly once per post. Completion runs
//! the optional callback on whichever thread executed the store query, then
//! wakes every task waiting in [`AsyncOp::wait`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──post──► Posted ──begin──► Running ──complete──► Done
//!                  │                                       ▲
//!                  └──────────────cancel───────────────────┘
//! Done ──reset──► Idle
//! ```
//!
//! Cancelling a `Posted` operation completes it as `Cancelled` without
//! running the query or the callback. Cancelling a `Running` or `Done`
//! operation has no effect.

use crate::error::ClientError;
use exchange_rs::Message;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Completion callback, invoked once per completed post.
pub type Callback = Arc<dyn Fn(&OpCompletion) + Send + Sync + 'static>;

/// What a receive-class operation asks the store for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvQuery {
    /// The message stored under `key`.
    Exact { key: u64 },
    /// `count` contiguous messages ending at `key`.
    Window { key: u64, count: usize },
    /// Up to `count` messages from the smallest key `>= approx_key`.
    Fuzzy { approx_key: u64, count: usize },
}

impl RecvQuery {
    /// The key carried by the query.
    pub fn key(&self) -> u64 {
        match *self {
            Self::Exact { key } | Self::Window { key, .. } => key,
            Self::Fuzzy { approx_key, .. } => approx_key,
        }
    }

    /// The zero-length probe message carrying the query key.
    pub fn probe(&self) -> Message {
        Message::probe(self.key())
    }
}

/// Successful result of an operation, one variant per operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutput {
    /// A publish was admitted. Messages evicted to make room are handed
    /// back here for the publisher to dispose of.
    Published { evicted: Vec<Message> },
    /// A receive found these messages.
    Received { messages: Vec<Message> },
}

/// The outcome delivered to callbacks and waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpCompletion {
    result: Result<OpOutput, ClientError>,
}

impl OpCompletion {
    pub(crate) fn new(result: Result<OpOutput, ClientError>) -> Self {
        Self { result }
    }

    pub fn result(&self) -> &Result<OpOutput, ClientError> {
        &self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.result.as_ref().err()
    }

    /// Received or evicted messages; empty on failure.
    pub fn messages(&self) -> &[Message] {
        match &self.result {
            Ok(OpOutput::Published { evicted }) => evicted,
            Ok(OpOutput::Received { messages }) => messages,
            Err(_) => &[],
        }
    }

    /// Number of messages carried; zero on failure.
    pub fn count(&self) -> usize {
        self.messages().len()
    }

    pub fn into_result(self) -> Result<OpOutput, ClientError> {
        self.result
    }

    /// Takes ownership of the carried messages.
    pub fn into_messages(self) -> Result<Vec<Message>, ClientError> {
        match self.result? {
            OpOutput::Published { evicted } => Ok(evicted),
            OpOutput::Received { messages } => Ok(messages),
        }
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Posted,
    Running,
    Done(OpCompletion),
}

struct OpState {
    phase: Phase,
    /// Bumped on every post so a stale task cannot claim a later post
    generation: u64,
}

struct OpInner {
    state: Mutex<OpState>,
    cancel: Mutex<CancellationToken>,
    done: watch::Sender<bool>,
    callback: Option<Callback>,
}

/// A reusable asynchronous operation handle.
///
/// Clones share the same operation; the socket holds one while it executes.
#[derive(Clone)]
pub struct AsyncOp {
    inner: Arc<OpInner>,
}

impl fmt::Debug for AsyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOp")
            .field("phase", &self.inner.state.lock().phase)
            .field("has_callback", &self.inner.callback.is_some())
            .finish()
    }
}

impl Default for AsyncOp {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncOp {
    /// Creates an idle operation without a callback.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an idle operation whose callback runs on every completion.
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(&OpCompletion) + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(callback)))
    }

    fn build(callback: Option<Callback>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(OpInner {
                state: Mutex::new(OpState {
                    phase: Phase::Idle,
                    generation: 0,
                }),
                cancel: Mutex::new(CancellationToken::new()),
                done,
                callback,
            }),
        }
    }

    // ---------------------------------------------------------------------
    // CALLER API
    // ---------------------------------------------------------------------

    /// Waits for completion and returns the outcome.
    ///
    /// Returns `Cancelled` immediately if the operation was never posted.
    pub async fn wait(&self) -> OpCompletion {
        let mut done = self.inner.done.subscribe();
        if matches!(self.inner.state.lock().phase, Phase::Idle) {
            return OpCompletion::new(Err(ClientError::Cancelled));
        }
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = done.wait_for(|finished| *finished).await;
        self.completion()
            .unwrap_or_else(|| OpCompletion::new(Err(ClientError::Cancelled)))
    }

    /// Returns the outcome if the operation has completed.
    pub fn completion(&self) -> Option<OpCompletion> {
        match &self.inner.state.lock().phase {
            Phase::Done(completion) => Some(completion.clone()),
            _ => None,
        }
    }

    /// Returns `true` once the operation has completed (or was cancelled).
    pub fn is_done(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Done(_))
    }

    /// Returns `true` while the operation is posted or running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Posted | Phase::Running)
    }

    /// Cancels the operation if its query has not started.
    ///
    /// Returns `true` if this call prevented the query from running.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(state.phase, Phase::Posted) {
            return false;
        }
        self.inner.cancel.lock().cancel();
        state.phase = Phase::Done(OpCompletion::new(Err(ClientError::Cancelled)));
        drop(state);

        self.inner.done.send_replace(true);
        true
    }

    /// The cancellation token of the current post.
    ///
    /// Cancelling it from anywhere has the same effect as [`cancel`](Self::cancel)
    /// as long as the query has not started.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.lock().clone()
    }

    /// Returns a completed operation to `Idle` so it can be posted again.
    pub fn reset(&self) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock();
        match state.phase {
            Phase::Posted | Phase::Running => Err(ClientError::OpInFlight),
            Phase::Idle | Phase::Done(_) => {
                state.phase = Phase::Idle;
                *self.inner.cancel.lock() = CancellationToken::new();
                self.inner.done.send_replace(false);
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------------
    // SOCKET SIDE
    // ---------------------------------------------------------------------

    /// Marks the operation posted and returns the post's generation.
    /// At most one outstanding completion.
    pub(crate) fn post(&self) -> Result<u64, ClientError> {
        let mut state = self.inner.state.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Posted;
                state.generation += 1;
                Ok(state.generation)
            }
            Phase::Posted | Phase::Running => Err(ClientError::OpInFlight),
            Phase::Done(_) => Err(ClientError::OpNeedsReset),
        }
    }

    /// Claims the operation for execution.
    ///
    /// Returns `false` if it was cancelled first; a token cancelled while the
    /// operation was queued is turned into a `Cancelled` completion here.
    pub(crate) fn begin(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(state.phase, Phase::Posted) || state.generation != generation {
            return false;
        }
        if self.inner.cancel.lock().is_cancelled() {
            state.phase = Phase::Done(OpCompletion::new(Err(ClientError::Cancelled)));
            drop(state);
            self.inner.done.send_replace(true);
            return false;
        }
        state.phase = Phase::Running;
        true
    }

    /// Stores the outcome, runs the callback once and wakes waiters.
    pub(crate) fn complete(&self, completion: OpCompletion) {
        {
            let mut state = self.inner.state.lock();
            debug_assert!(
                matches!(state.phase, Phase::Running),
                "completing an operation that is not running"
            );
            state.phase = Phase::Done(completion.clone());
        }

        if let Some(callback) = &self.inner.callback {
            callback(&completion);
        }

        self.inner.done.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn received(keys: &[u64]) -> OpCompletion {
        OpCompletion::new(Ok(OpOutput::Received {
            messages: keys.iter().map(|&k| Message::probe(k)).collect(),
        }))
    }

    #[test]
    fn test_recv_query_key_message() {
        let query = RecvQuery::Fuzzy {
            approx_key: 12,
            count: 3,
        };
        let probe = query.probe();
        assert_eq!(probe.key(), 12);
        assert!(probe.is_empty());
        assert_eq!(RecvQuery::Window { key: 4, count: 2 }.probe().key(), 4);
    }

    #[test]
    fn test_lifecycle() {
        let op = AsyncOp::new();
        assert!(!op.is_in_flight());

        let generation = op.post().unwrap();
        assert!(op.is_in_flight());
        assert_eq!(op.post(), Err(ClientError::OpInFlight));

        assert!(op.begin(generation));
        op.complete(received(&[1, 2]));
        assert!(op.is_done());
        assert_eq!(op.completion().unwrap().count(), 2);

        assert_eq!(op.post(), Err(ClientError::OpNeedsReset));
        op.reset().unwrap();
        op.post().unwrap();
    }

    #[test]
    fn test_stale_generation_cannot_claim_new_post() {
        let op = AsyncOp::new();
        let first = op.post().unwrap();
        assert!(op.cancel());
        op.reset().unwrap();

        let second = op.post().unwrap();
        assert!(!op.begin(first));
        assert!(op.is_in_flight());
        assert!(op.begin(second));
    }

    #[test]
    fn test_reset_while_in_flight() {
        let op = AsyncOp::new();
        op.post().unwrap();
        assert_eq!(op.reset(), Err(ClientError::OpInFlight));
    }

    #[test]
    fn test_cancel_before_begin_skips_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = AsyncOp::with_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let generation = op.post().unwrap();
        assert!(op.cancel());
        assert!(!op.begin(generation));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let completion = op.completion().unwrap();
        assert_eq!(completion.error(), Some(&ClientError::Cancelled));
        assert_eq!(completion.count(), 0);
    }

    #[test]
    fn test_cancel_after_begin_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = AsyncOp::with_callback(move |c| {
            assert!(c.is_ok());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let generation = op.post().unwrap();
        assert!(op.begin(generation));
        assert!(!op.cancel());
        op.complete(received(&[7]));
        assert!(!op.cancel());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(op.completion().unwrap().is_ok());
    }

    #[test]
    fn test_cancelled_token_stops_begin() {
        let op = AsyncOp::new();
        let generation = op.post().unwrap();
        op.cancellation_token().cancel();

        assert!(!op.begin(generation));
        assert_eq!(
            op.completion().unwrap().into_result(),
            Err(ClientError::Cancelled)
        );

        // A reset issues a fresh token
        op.reset().unwrap();
        assert!(!op.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_completion() {
        let op = AsyncOp::new();
        let generation = op.post().unwrap();

        let worker = op.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            assert!(worker.begin(generation));
            worker.complete(received(&[3]));
        });

        let completion = op.wait().await;
        assert_eq!(completion.into_messages().unwrap()[0].key(), 3);
    }

    #[tokio::test]
    async fn test_wait_on_idle_op() {
        let op = AsyncOp::new();
        assert_eq!(op.wait().await.error(), Some(&ClientError::Cancelled));
    }
}
