//! Error types for exchange store operations.

use crate::message::Message;
use thiserror::Error;

/// Errors that can occur in ring buffer and exchange store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Bad creation or query parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No stored entry qualifies for the lookup.
    #[error("no message found for key {key}")]
    NotFound {
        /// The key (or approximate key) that was looked up.
        key: u64,
    },

    /// A bounded-count fetch cannot be satisfied in full.
    #[error("requested {requested} messages but only {available} are available")]
    InsufficientCount {
        /// Number of messages the caller asked for.
        requested: usize,
        /// Number of contiguous messages that actually exist.
        available: usize,
    },

    /// Allocating the result or the buffer storage failed.
    #[error("allocation failed")]
    AllocationFailure,

    /// The store is not attached to an active socket.
    #[error("exchange is not bound to an active socket")]
    NotBound,

    /// A key was admitted that does not follow the newest stored key.
    #[error("key {key} is not newer than the newest stored key {newest}")]
    KeyOutOfOrder {
        /// The rejected key.
        key: u64,
        /// The newest key currently stored.
        newest: u64,
    },

    /// The buffer is full and its overflow policy refuses new messages.
    #[error("ring buffer `{buffer}` is full")]
    BufferFull {
        /// Name of the full buffer.
        buffer: String,
    },

    /// The topic does not resolve to any buffer of this exchange.
    #[error("topic `{topic}` is not routed by this exchange")]
    NoRoute {
        /// The unmatched topic.
        topic: String,
    },
}

impl ExchangeError {
    /// Returns `true` for misses that are expected during normal operation
    /// (e.g. a client asking for a key that was already evicted).
    #[inline]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InsufficientCount { .. })
    }

    /// Returns `true` if the error is fatal to the triggering call only
    /// because of resource exhaustion.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllocationFailure)
    }
}

impl From<std::collections::TryReserveError> for ExchangeError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure
    }
}

/// A message that could not be admitted, handed back to the caller together
/// with the reason.
///
/// Ownership of the message never passes to the store on failure.
#[derive(Debug, Error)]
#[error("message with key {key} rejected: {error}", key = .message.key())]
pub struct Rejected {
    /// Why the message was refused.
    pub error: ExchangeError,
    /// The refused message, returned untouched.
    pub message: Message,
}

impl Rejected {
    pub(crate) fn new(error: ExchangeError, message: Message) -> Self {
        Self { error, message }
    }

    /// Splits the rejection into its error and the returned message.
    pub fn into_parts(self) -> (ExchangeError, Message) {
        (self.error, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(ExchangeError::NotFound { key: 1 }.is_miss());
        assert!(ExchangeError::InsufficientCount {
            requested: 2,
            available: 1
        }
        .is_miss());
        assert!(!ExchangeError::NotBound.is_miss());

        assert!(ExchangeError::AllocationFailure.is_fatal());
        assert!(!ExchangeError::NotFound { key: 1 }.is_fatal());
        assert!(!ExchangeError::BufferFull { buffer: "a".into() }.is_fatal());
    }

    #[test]
    fn test_try_reserve_failure_maps_to_allocation_failure() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(ExchangeError::from(err), ExchangeError::AllocationFailure);
    }

    #[test]
    fn test_rejected_display_names_key() {
        let rejected = Rejected::new(ExchangeError::NotBound, Message::probe(7));
        assert_eq!(
            rejected.to_string(),
            "message with key 7 rejected: exchange is not bound to an active socket"
        );
    }
}
