use crate::{ExchangeConfig, ExchangeError, Message, Metrics, Rejected, RingBuffer};
use crate::sync::Mutex;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A named exchange binding one topic to one or more ring buffers.
///
/// Each ring buffer sits behind its own lock, so operations on different
/// buffers never contend. There is no store-wide lock.
#[derive(Debug)]
pub struct ExchangeStore {
    name: String,
    topic: String,
    buffers: Vec<CachePadded<Mutex<RingBuffer>>>,
    /// Number of sockets this store is attached to
    bindings: AtomicUsize,
}

/// Creates an exchange with `buffer_names.len()` ring buffers of `capacity`
/// slots each.
///
/// # Example
///
/// ```
/// use exchange_rs::{exchange_init, Message};
///
/// let exchange = exchange_init("exchange1", "topic1", 10, &["ringBuffer1"]).unwrap();
/// exchange.attach();
///
/// let evicted = exchange.route("topic1", Message::probe(0)).unwrap();
/// assert!(evicted.is_empty());
/// assert!(exchange.lookup_by_key(0).is_ok());
/// ```
pub fn exchange_init<S: AsRef<str>>(
    name: &str,
    topic: &str,
    capacity: usize,
    buffer_names: &[S],
) -> Result<Arc<ExchangeStore>, ExchangeError> {
    ExchangeStore::create(name, topic, capacity, buffer_names).map(Arc::new)
}

impl ExchangeStore {
    /// Creates a store, validating the parameters first.
    ///
    /// Fails with `InvalidArgument` if `capacity` is zero or `buffer_names`
    /// is empty; no partial store is left behind.
    pub fn create<S: AsRef<str>>(
        name: &str,
        topic: &str,
        capacity: usize,
        buffer_names: &[S],
    ) -> Result<Self, ExchangeError> {
        let mut config = ExchangeConfig::new(name, topic).with_capacity(capacity);
        for buffer in buffer_names {
            config = config.with_buffer(buffer.as_ref());
        }
        Self::from_config(&config)
    }

    /// Creates a store from a validated configuration.
    pub fn from_config(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        config.validate()?;

        let ring_config = config.ring_config();
        let buffers = config
            .buffer_names
            .iter()
            .map(|name| {
                RingBuffer::new(name.clone(), ring_config)
                    .map(|rb| CachePadded::new(Mutex::new(rb)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            exchange = %config.name,
            topic = %config.topic,
            capacity = config.capacity,
            buffers = buffers.len(),
            "exchange created"
        );

        Ok(Self {
            name: config.name.clone(),
            topic: config.topic.clone(),
            buffers,
            bindings: AtomicUsize::new(0),
        })
    }

    // ---------------------------------------------------------------------
    // IDENTITY & BINDING
    // ---------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ring buffer names in configuration order.
    pub fn buffer_names(&self) -> Vec<String> {
        self.buffers
            .iter()
            .map(|b| b.lock().name().to_owned())
            .collect()
    }

    /// Records that a socket attached this store.
    pub fn attach(&self) {
        let previous = self.bindings.fetch_add(1, Ordering::AcqRel);
        info!(exchange = %self.name, sockets = previous + 1, "exchange bound");
    }

    /// Records that a socket released this store.
    pub fn detach(&self) {
        let result = self
            .bindings
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match result {
            Ok(previous) => {
                info!(exchange = %self.name, sockets = previous - 1, "exchange unbound");
            }
            Err(_) => warn!(exchange = %self.name, "detach on an exchange that is not bound"),
        }
    }

    /// Returns `true` while at least one socket has this store attached.
    pub fn is_bound(&self) -> bool {
        self.bindings.load(Ordering::Acquire) > 0
    }

    // ---------------------------------------------------------------------
    // ROUTING
    // ---------------------------------------------------------------------

    /// Admits `message` into every ring buffer serving `topic` and returns
    /// the messages evicted to make room.
    ///
    /// Admission is all-or-nothing: every buffer is locked in configuration
    /// order and checked first. If any buffer would refuse the message, no
    /// buffer changes and the message comes back inside [`Rejected`].
    /// Otherwise every buffer gets an independent copy.
    pub fn route(&self, topic: &str, message: Message) -> Result<Vec<Message>, Rejected> {
        if topic != self.topic {
            return Err(Rejected::new(
                ExchangeError::NoRoute {
                    topic: topic.to_owned(),
                },
                message,
            ));
        }

        let key = message.key();
        let mut guards: Vec<_> = self.buffers.iter().map(|buffer| buffer.lock()).collect();

        for ring in &guards {
            if let Err(error) = ring.check_admission(key) {
                return Err(ring.refuse(error, message));
            }
        }

        let last = guards.len() - 1;
        let mut evicted = Vec::new();
        for (i, ring) in guards.iter_mut().enumerate() {
            let copy = if i == last {
                message.clone()
            } else {
                message.deep_copy()
            };
            evicted.extend(ring.insert(key, copy));
        }
        drop(guards);

        debug!(exchange = %self.name, key, evicted = evicted.len(), "routed message");
        Ok(evicted)
    }

    /// Removes and returns the oldest message of the named buffer.
    pub fn dequeue(&self, buffer: &str) -> Result<Option<Message>, ExchangeError> {
        self.with_buffer(buffer, RingBuffer::dequeue)
    }

    /// Empties every buffer, returning their messages buffer by buffer.
    pub fn drain_all(&self) -> Vec<Message> {
        self.buffers
            .iter()
            .flat_map(|buffer| buffer.lock().drain())
            .collect()
    }

    // ---------------------------------------------------------------------
    // QUERIES
    // ---------------------------------------------------------------------

    /// Exact-key lookup across the store's buffers.
    pub fn lookup_by_key(&self, key: u64) -> Result<Message, ExchangeError> {
        self.query(|rb| rb.get_by_key(key))
    }

    /// `n` contiguous messages ending at `key`, oldest first.
    pub fn lookup_n_by_key(&self, key: u64, n: usize) -> Result<Vec<Message>, ExchangeError> {
        self.query(|rb| rb.get_n_by_key(key, n))
    }

    /// Up to `n` messages from the smallest key `>= approx_key`.
    pub fn lookup_fuzzy(&self, approx_key: u64, n: usize) -> Result<Vec<Message>, ExchangeError> {
        self.query(|rb| rb.fuzzy_search(approx_key, n))
    }

    // ---------------------------------------------------------------------
    // INTROSPECTION
    // ---------------------------------------------------------------------

    /// Number of live entries in the named buffer.
    pub fn buffer_len(&self, buffer: &str) -> Result<usize, ExchangeError> {
        self.with_buffer(buffer, |rb| rb.len())
    }

    /// Live keys of the named buffer in admission order.
    pub fn buffer_keys(&self, buffer: &str) -> Result<Vec<u64>, ExchangeError> {
        self.with_buffer(buffer, |rb| rb.keys())
    }

    /// Metrics snapshot of the named buffer.
    pub fn buffer_metrics(&self, buffer: &str) -> Result<Metrics, ExchangeError> {
        self.with_buffer(buffer, |rb| rb.metrics())
    }

    /// Metrics aggregated over all buffers.
    pub fn metrics(&self) -> Metrics {
        let mut total = Metrics::new();
        for buffer in &self.buffers {
            total.merge(&buffer.lock().metrics());
        }
        total
    }

    /// Runs `f` against each buffer in order, returning the first success or
    /// the first buffer's error. A fatal error stops the search at once.
    fn query<T>(
        &self,
        mut f: impl FnMut(&RingBuffer) -> Result<T, ExchangeError>,
    ) -> Result<T, ExchangeError> {
        if !self.is_bound() {
            return Err(ExchangeError::NotBound);
        }

        let mut first_error = None;
        for buffer in &self.buffers {
            match f(&buffer.lock()) {
                Ok(found) => return Ok(found),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        // `buffers` is never empty, so an error was recorded
        Err(first_error.unwrap_or(ExchangeError::NotFound { key: 0 }))
    }

    fn with_buffer<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut RingBuffer) -> T,
    ) -> Result<T, ExchangeError> {
        for buffer in &self.buffers {
            let mut guard = buffer.lock();
            if guard.name() == name {
                return Ok(f(&mut guard));
            }
        }
        Err(ExchangeError::InvalidArgument(format!(
            "exchange `{}` has no ring buffer `{name}`",
            self.name
        )))
    }
}
