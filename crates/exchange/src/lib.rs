//! Exchange - keyed, bounded, per-topic message store
//!
//! The storage side of a pub/sub broker's "exchange" extension. Published
//! messages are admitted into fixed-capacity circular buffers keyed by an
//! application-supplied 64-bit key (a timestamp in broker usage), and can be
//! read back by exact key, by a bounded window ending at a key, or by a fuzzy
//! nearest-key search.
//!
//! # Key Features
//!
//! - Fixed slot arena per buffer, allocated once at creation
//! - Overflow hands the evicted message back to the publisher instead of
//!   dropping it
//! - One lock per ring buffer, no store-wide lock
//! - Exact-or-error windowed fetch (no silent truncation)
//!
//! # Example
//!
//! ```
//! use exchange_rs::{ExchangeStore, Message};
//!
//! let store = ExchangeStore::create("exchange1", "topic1", 2, &["ringBuffer1"]).unwrap();
//! store.attach();
//!
//! for key in 0..2 {
//!     store.route("topic1", Message::probe(key)).unwrap();
//! }
//!
//! // Buffer is full: the oldest message comes back to the publisher
//! let evicted = store.route("topic1", Message::probe(2)).unwrap();
//! assert_eq!(evicted[0].key(), 0);
//!
//! let window = store.lookup_n_by_key(2, 2).unwrap();
//! assert_eq!(window.iter().map(Message::key).collect::<Vec<_>>(), vec![1, 2]);
//! ```

mod config;
mod error;
mod invariants;
mod message;
mod metrics;
mod ring_buffer;
mod store;
mod sync;

pub use config::{ExchangeConfig, OverflowPolicy, RingConfig, DEFAULT_CAPACITY};
pub use error::{ExchangeError, Rejected};
pub use message::Message;
pub use metrics::Metrics;
pub use ring_buffer::RingBuffer;
pub use store::{exchange_init, ExchangeStore};
