#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_bounded_len, debug_assert_evicted_oldest, debug_assert_keys_increasing,
    debug_assert_occupied,
};
use crate::metrics::MetricsRecorder;
use crate::{ExchangeError, Message, Metrics, OverflowPolicy, Rejected, RingConfig};
use tracing::{debug, trace, warn};

// =============================================================================
// SLOT LAYOUT
// =============================================================================
//
// Storage is a fixed arena of `capacity` optional slots allocated once at
// construction. Live entries occupy the logical range `[0, len)`, where
// logical position `i` lives at physical index `(head + i) % capacity`.
// Logical position 0 is the oldest entry, `len - 1` the newest.
//
// Keys strictly increase with logical position, so every lookup is a binary
// search over logical positions instead of a map.
//
// Moving a message out of the arena is `Option::take`, which leaves `None`
// behind: once a message is evicted or dequeued no query can reach it again.
//
// =============================================================================

/// A fixed-capacity, key-ordered circular message store.
///
/// Not internally synchronized: the exchange store wraps each buffer in its
/// own lock.
#[derive(Debug)]
pub struct RingBuffer {
    name: String,
    config: RingConfig,
    slots: Box<[Option<Message>]>,
    /// Physical index of the oldest entry
    head: usize,
    len: usize,
    metrics: MetricsRecorder,
}

impl RingBuffer {
    /// Creates an empty ring buffer.
    ///
    /// Fails with `InvalidArgument` on zero capacity and `AllocationFailure`
    /// if the slot arena cannot be allocated.
    pub fn new(name: impl Into<String>, config: RingConfig) -> Result<Self, ExchangeError> {
        if config.capacity == 0 {
            return Err(ExchangeError::InvalidArgument(
                "ring buffer capacity must be greater than zero".into(),
            ));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(config.capacity)?;
        slots.resize_with(config.capacity, || None);

        Ok(Self {
            name: name.into(),
            config,
            slots: slots.into_boxed_slice(),
            head: 0,
            len: 0,
            metrics: MetricsRecorder::new(config.enable_metrics),
        })
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Returns the buffer name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum number of live entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.config.capacity
    }

    /// Key of the oldest live entry.
    pub fn oldest_key(&self) -> Option<u64> {
        (self.len > 0).then(|| self.key_at(0))
    }

    /// Key of the newest live entry.
    pub fn newest_key(&self) -> Option<u64> {
        (self.len > 0).then(|| self.key_at(self.len - 1))
    }

    /// All live keys in admission order.
    pub fn keys(&self) -> Vec<u64> {
        (0..self.len).map(|i| self.key_at(i)).collect()
    }

    /// Returns a metrics snapshot (all zeroes unless metrics are enabled).
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    // ---------------------------------------------------------------------
    // ADMISSION
    // ---------------------------------------------------------------------

    /// Admits `message` under `key` at the newest position.
    ///
    /// If the buffer is full and the overflow policy is `Evict`, the oldest
    /// message is removed and returned; the caller owns it from then on.
    /// On failure the message is handed back inside [`Rejected`].
    pub fn admit(&mut self, key: u64, mut message: Message) -> Result<Option<Message>, Rejected> {
        message.set_key(key);
        match self.check_admission(key) {
            Ok(()) => Ok(self.insert(key, message)),
            Err(error) => Err(self.refuse(error, message)),
        }
    }

    /// Reports whether `key` would be admitted now, without changing the
    /// buffer.
    ///
    /// Fails with `KeyOutOfOrder` unless `key` is above the newest key, and
    /// with `BufferFull` when the buffer is full under the `Reject` policy.
    pub fn check_admission(&self, key: u64) -> Result<(), ExchangeError> {
        if let Some(newest) = self.newest_key() {
            if key <= newest {
                return Err(ExchangeError::KeyOutOfOrder { key, newest });
            }
        }
        if self.is_full() && self.config.overflow == OverflowPolicy::Reject {
            return Err(ExchangeError::BufferFull {
                buffer: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Records a refusal and wraps the message for return to its owner.
    pub(crate) fn refuse(&self, error: ExchangeError, message: Message) -> Rejected {
        self.metrics.record_reject();
        warn!(buffer = %self.name, key = message.key(), %error, "refusing message");
        Rejected::new(error, message)
    }

    /// Stores a message that passed [`check_admission`](Self::check_admission),
    /// evicting the oldest entry if the buffer is full.
    pub(crate) fn insert(&mut self, key: u64, mut message: Message) -> Option<Message> {
        message.set_key(key);

        #[cfg(debug_assertions)]
        if let Some(newest) = self.newest_key() {
            debug_assert_keys_increasing!(newest, key);
        }

        if !self.is_full() {
            let idx = self.physical(self.len);
            self.slots[idx] = Some(message);
            self.len += 1;
            self.metrics.record_admit();

            #[cfg(debug_assertions)]
            debug_assert_bounded_len!(self.len, self.capacity());

            return None;
        }

        debug_assert_eq!(self.config.overflow, OverflowPolicy::Evict);

        // Full: the oldest slot is also the next free one.
        #[cfg(debug_assertions)]
        let oldest = self.key_at(0);

        let evicted = self.slots[self.head].replace(message);
        self.head = (self.head + 1) % self.capacity();
        self.metrics.record_admit();
        self.metrics.record_evict();

        if let Some(ref old) = evicted {
            #[cfg(debug_assertions)]
            debug_assert_evicted_oldest!(old.key(), oldest);
            debug!(buffer = %self.name, key, evicted = old.key(), "evicted oldest entry");
        }

        #[cfg(debug_assertions)]
        debug_assert_bounded_len!(self.len, self.capacity());

        evicted
    }

    /// Removes and returns the oldest message.
    pub fn dequeue(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let message = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        self.metrics.record_dequeue();
        message
    }

    /// Removes every message, returning them in admission order.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(message) = self.dequeue() {
            out.push(message);
        }
        self.head = 0;
        out
    }

    // ---------------------------------------------------------------------
    // QUERIES
    // ---------------------------------------------------------------------

    /// Exact-key lookup.
    ///
    /// Returns a fresh handle over the stored bytes; the slot keeps its own.
    pub fn get_by_key(&self, key: u64) -> Result<Message, ExchangeError> {
        let result = self
            .position_of(key)
            .map(|pos| self.slot(pos).clone())
            .ok_or(ExchangeError::NotFound { key });

        self.metrics.record_lookup(result.is_ok());
        trace!(buffer = %self.name, key, hit = result.is_ok(), "get_by_key");
        result
    }

    /// Returns exactly `n` contiguously admitted messages ending at `key`,
    /// oldest first.
    ///
    /// Fails without returning anything if `key` is absent (`NotFound`) or
    /// fewer than `n` messages were admitted up to and including `key`
    /// (`InsufficientCount`).
    pub fn get_n_by_key(&self, key: u64, n: usize) -> Result<Vec<Message>, ExchangeError> {
        if n == 0 {
            return Err(ExchangeError::InvalidArgument(
                "message count must be greater than zero".into(),
            ));
        }

        let result = self.window_ending_at(key, n);
        self.metrics.record_lookup(result.is_ok());
        trace!(buffer = %self.name, key, n, hit = result.is_ok(), "get_n_by_key");
        result
    }

    /// Returns up to `n` messages starting at the smallest key `>= approx_key`,
    /// in key order.
    ///
    /// Fails with `NotFound` when every stored key is below `approx_key`.
    pub fn fuzzy_search(&self, approx_key: u64, n: usize) -> Result<Vec<Message>, ExchangeError> {
        if n == 0 {
            return Err(ExchangeError::InvalidArgument(
                "message count must be greater than zero".into(),
            ));
        }

        let start = self.lower_bound(approx_key);
        let result = if start == self.len {
            Err(ExchangeError::NotFound { key: approx_key })
        } else {
            let end = start + n.min(self.len - start);
            self.collect_range(start, end)
        };

        self.metrics.record_lookup(result.is_ok());
        trace!(buffer = %self.name, approx_key, n, hit = result.is_ok(), "fuzzy_search");
        result
    }

    // ---------------------------------------------------------------------
    // INTERNALS
    // ---------------------------------------------------------------------

    fn window_ending_at(&self, key: u64, n: usize) -> Result<Vec<Message>, ExchangeError> {
        let pos = self.position_of(key).ok_or(ExchangeError::NotFound { key })?;
        let available = pos + 1;
        if available < n {
            return Err(ExchangeError::InsufficientCount {
                requested: n,
                available,
            });
        }
        self.collect_range(available - n, available)
    }

    /// Clones logical positions `[start, end)` into a new vector.
    fn collect_range(&self, start: usize, end: usize) -> Result<Vec<Message>, ExchangeError> {
        let mut out = Vec::new();
        out.try_reserve_exact(end - start)?;
        out.extend((start..end).map(|pos| self.slot(pos).clone()));
        Ok(out)
    }

    #[inline]
    fn physical(&self, pos: usize) -> usize {
        (self.head + pos) % self.capacity()
    }

    fn slot(&self, pos: usize) -> &Message {
        let slot = &self.slots[self.physical(pos)];

        #[cfg(debug_assertions)]
        debug_assert_occupied!(slot, pos, self.len);

        match slot {
            Some(message) => message,
            None => unreachable!("logical position {pos} below len {} is empty", self.len),
        }
    }

    #[inline]
    fn key_at(&self, pos: usize) -> u64 {
        self.slot(pos).key()
    }

    /// First logical position whose key is `>= key`, or `len` if none.
    fn lower_bound(&self, key: u64) -> usize {
        let (mut lo, mut hi) = (0, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn position_of(&self, key: u64) -> Option<usize> {
        let pos = self.lower_bound(key);
        (pos < self.len && self.key_at(pos) == key).then_some(pos)
    }
}
