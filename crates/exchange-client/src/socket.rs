//! Exchange client socket.

use crate::aio::{AsyncOp, OpCompletion, OpOutput, RecvQuery};
use crate::error::ClientError;
use crate::packet::PublishPacket;
use exchange_rs::{ExchangeError, ExchangeStore};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace};

static NEXT_SOCKET_ID: AtomicU32 = AtomicU32::new(1);

/// Typed socket options.
#[derive(Debug, Clone)]
pub enum SocketOption {
    /// Attach an exchange; publishes and receives route through it.
    ExchangeBind(Arc<ExchangeStore>),
    /// Detach the current exchange, if any.
    ExchangeUnbind,
}

/// A socket whose sends are admitted into, and whose receives are served
/// from, a bound [`ExchangeStore`].
///
/// Posted operations execute on the tokio runtime the socket was opened on.
/// Store calls never block on I/O, so the only suspension point is the
/// caller awaiting [`AsyncOp::wait`].
#[derive(Debug)]
pub struct ExchangeSocket {
    id: u32,
    runtime: Handle,
    exchange: RwLock<Option<Arc<ExchangeStore>>>,
    closed: AtomicBool,
}

impl ExchangeSocket {
    /// Opens a socket on the current tokio runtime.
    pub fn open() -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    /// Opens a socket that executes operations on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        debug!(socket = id, "exchange socket opened");
        Self {
            id,
            runtime,
            exchange: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // OPTIONS
    // ---------------------------------------------------------------------

    /// Applies a socket option.
    ///
    /// The closed flag is checked under the binding lock, so a bind racing
    /// `close` either lands before it (and is detached by it) or fails.
    pub fn set_option(&self, option: SocketOption) -> Result<(), ClientError> {
        let mut slot = self.exchange.write();
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let new = match option {
            SocketOption::ExchangeBind(exchange) => {
                exchange.attach();
                info!(socket = self.id, exchange = exchange.name(), "binding exchange");
                Some(exchange)
            }
            SocketOption::ExchangeUnbind => None,
        };

        let old = std::mem::replace(&mut *slot, new);
        drop(slot);
        if let Some(old) = old {
            old.detach();
        }
        Ok(())
    }

    /// Shorthand for `set_option(SocketOption::ExchangeBind(exchange))`.
    pub fn bind(&self, exchange: Arc<ExchangeStore>) -> Result<(), ClientError> {
        self.set_option(SocketOption::ExchangeBind(exchange))
    }

    /// The bound exchange, for protocol-internal callers that query it
    /// directly.
    pub fn exchange(&self) -> Option<Arc<ExchangeStore>> {
        self.exchange.read().clone()
    }

    /// Closes the socket and detaches its exchange. Idempotent.
    pub fn close(&self) {
        let mut slot = self.exchange.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let old = slot.take();
        drop(slot);

        if let Some(exchange) = old {
            exchange.detach();
        }
        debug!(socket = self.id, "exchange socket closed");
    }

    // ---------------------------------------------------------------------
    // OPERATIONS
    // ---------------------------------------------------------------------

    /// Posts a send-class operation publishing `packet`.
    ///
    /// On success the completion is `OpOutput::Published` carrying whatever
    /// the full ring buffers evicted. If the store refuses the message, the
    /// completion error is `ClientError::Rejected` holding it.
    ///
    /// Only errors that prevent posting (the operation is busy) are returned
    /// here; everything else arrives through the completion.
    pub fn send_aio(&self, op: &AsyncOp, packet: PublishPacket) -> Result<(), ClientError> {
        let exchange = self.current_exchange();
        let socket = self.id;

        self.submit(op, move || {
            let exchange = exchange?;
            let message = packet.encode()?;
            let evicted = exchange.route(&packet.topic, message)?;
            if !evicted.is_empty() {
                debug!(socket, count = evicted.len(), "returning evicted messages to publisher");
            }
            Ok(OpOutput::Published { evicted })
        })
    }

    /// Posts a receive-class operation.
    ///
    /// On success the completion is `OpOutput::Received`. Misses complete
    /// with the store error and zero messages.
    pub fn recv_aio(&self, op: &AsyncOp, query: RecvQuery) -> Result<(), ClientError> {
        let exchange = self.current_exchange();
        let socket = self.id;

        // The query key travels on a zero-length probe message
        let probe = query.probe();

        self.submit(op, move || {
            let exchange = exchange?;
            let key = probe.key();
            trace!(socket, ?query, key, "executing receive");
            let messages = match query {
                RecvQuery::Exact { .. } => vec![exchange.lookup_by_key(key)?],
                RecvQuery::Window { count, .. } => exchange.lookup_n_by_key(key, count)?,
                RecvQuery::Fuzzy { count, .. } => exchange.lookup_fuzzy(key, count)?,
            };
            Ok(OpOutput::Received { messages })
        })
    }

    fn current_exchange(&self) -> Result<Arc<ExchangeStore>, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.exchange()
            .ok_or(ClientError::Exchange(ExchangeError::NotBound))
    }

    /// Marks `op` posted and runs `job` on the runtime. One post is one
    /// store query.
    ///
    /// A panicking job still completes the operation, with `JobPanicked`.
    fn submit<F>(&self, op: &AsyncOp, job: F) -> Result<(), ClientError>
    where
        F: FnOnce() -> Result<OpOutput, ClientError> + Send + 'static,
    {
        let generation = op.post()?;

        let op = op.clone();
        let socket = self.id;
        self.runtime.spawn(async move {
            if op.begin(generation) {
                let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                    let reason = panic_reason(payload.as_ref());
                    error!(socket, %reason, "operation panicked");
                    Err(ClientError::JobPanicked(reason))
                });
                op.complete(OpCompletion::new(result));
            }
        });
        Ok(())
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_owned()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl Drop for ExchangeSocket {
    fn drop(&mut self) {
        self.close();
    }
}
