//! Loom-based concurrency tests for exchange-rs.
//!
//! Run with: `cargo test -p exchange-rs --features loom --test loom_tests --release`
//!
//! With the `loom` feature the store's per-buffer locks are loom mutexes,
//! so these models explore every interleaving of `ExchangeStore::route` and
//! the lookups against each other.

#![cfg(feature = "loom")]

use exchange_rs::{exchange_init, ExchangeError, ExchangeStore, Message};
use loom::thread;
use std::sync::Arc;

fn bound_store(capacity: usize, buffers: &[&str]) -> Arc<ExchangeStore> {
    let store = exchange_init("loom", "topic", capacity, buffers).unwrap();
    store.attach();
    store
}

#[test]
fn loom_routes_land_in_every_buffer_or_none() {
    loom::model(|| {
        let store = bound_store(2, &["a", "b"]);
        store.route("topic", Message::probe(0)).unwrap();

        let publishers: Vec<_> = [1u64, 2]
            .into_iter()
            .map(|key| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.route("topic", Message::probe(key)))
            })
            .collect();

        let results: Vec<_> = publishers.into_iter().map(|p| p.join().unwrap()).collect();

        // Key 2 always lands; key 1 lands only if it got there first
        assert!(results[1].is_ok());
        if let Err(rejected) = &results[0] {
            assert_eq!(
                rejected.error,
                ExchangeError::KeyOutOfOrder { key: 1, newest: 2 }
            );
        }

        let a = store.buffer_keys("a").unwrap();
        assert_eq!(a, store.buffer_keys("b").unwrap());
        assert_eq!(a.last(), Some(&2));
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    });
}

#[test]
fn loom_reader_sees_consistent_window() {
    loom::model(|| {
        let store = bound_store(2, &["rb"]);
        store.route("topic", Message::probe(0)).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let evicted = store.route("topic", Message::probe(1)).unwrap();
                assert!(evicted.is_empty());
                store.route("topic", Message::probe(2)).unwrap()
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let found = store.lookup_fuzzy(0, 2).unwrap();
                let keys: Vec<u64> = found.iter().map(Message::key).collect();
                assert!(!keys.is_empty() && keys.len() <= 2);
                assert!(keys.windows(2).all(|w| w[0] < w[1]));

                // The newest key never has a gap behind it
                let newest = keys[keys.len() - 1];
                match store.lookup_n_by_key(newest, 1) {
                    Ok(window) => assert_eq!(window[0].key(), newest),
                    Err(e) => assert!(e.is_miss()),
                }
            })
        };

        let evicted = writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(evicted.iter().map(Message::key).collect::<Vec<_>>(), vec![0]);
        assert_eq!(store.buffer_keys("rb").unwrap(), vec![1, 2]);
    });
}
