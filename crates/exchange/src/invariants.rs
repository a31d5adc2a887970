//! Debug assertion macros for ring buffer invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release builds
//! pay nothing for them.

// =============================================================================
// Bounded Count
// =============================================================================

/// Assert that the number of live slots does not exceed capacity.
///
/// **Invariant**: `0 ≤ len ≤ capacity`
///
/// Used in: `RingBuffer::admit()` after placing the new entry
macro_rules! debug_assert_bounded_len {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "bounded count violated: len {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

// =============================================================================
// Key Order
// =============================================================================

/// Assert that keys strictly increase in admission order.
///
/// **Invariant**: `key(i) < key(i + 1)` for all live logical positions
///
/// Used in: `RingBuffer::admit()` before placing the new entry
macro_rules! debug_assert_keys_increasing {
    ($newest:expr, $key:expr) => {
        debug_assert!(
            $key > $newest,
            "key order violated: admitting {} after {}",
            $key,
            $newest
        )
    };
}

// =============================================================================
// Eviction
// =============================================================================

/// Assert that the evicted entry is the oldest one.
///
/// **Invariant**: eviction returns exactly the entry at logical position 0
///
/// Used in: `RingBuffer::admit()` on overflow
macro_rules! debug_assert_evicted_oldest {
    ($evicted:expr, $oldest:expr) => {
        debug_assert_eq!(
            $evicted, $oldest,
            "eviction violated: evicted key {} but oldest key was {}",
            $evicted, $oldest
        )
    };
}

// =============================================================================
// Slot Occupancy
// =============================================================================

/// Assert that a logical position inside `[0, len)` maps to an occupied slot.
///
/// **Invariant**: `slots[phys(i)] is Some ⟺ i < len`
///
/// Used in: `RingBuffer::slot()`
macro_rules! debug_assert_occupied {
    ($slot:expr, $pos:expr, $len:expr) => {
        debug_assert!(
            $slot.is_some(),
            "occupancy violated: logical slot {} empty while len is {}",
            $pos,
            $len
        )
    };
}

pub(crate) use debug_assert_bounded_len;
pub(crate) use debug_assert_evicted_oldest;
pub(crate) use debug_assert_keys_increasing;
pub(crate) use debug_assert_occupied;
