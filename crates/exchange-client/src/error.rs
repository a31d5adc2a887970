//! Error types for exchange client operations.

use exchange_rs::{ExchangeError, Message, Rejected};
use thiserror::Error;

/// Errors delivered by sockets and async operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The underlying store reported an error.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The store refused a published message; it is handed back here.
    #[error("publish rejected: {error}")]
    Rejected {
        /// Why the store refused the message.
        error: ExchangeError,
        /// The refused message.
        message: Message,
    },

    /// The operation is already posted and has not completed.
    #[error("operation is already in flight")]
    OpInFlight,

    /// The operation has completed and must be reset before reuse.
    #[error("operation must be reset before reuse")]
    OpNeedsReset,

    /// The operation was cancelled before it ran.
    #[error("operation cancelled")]
    Cancelled,

    /// No tokio runtime is available to execute operations.
    #[error("no async runtime available")]
    NoRuntime,

    /// The socket has been closed.
    #[error("socket is closed")]
    Closed,

    /// The operation's store query panicked; the operation still completed.
    #[error("operation aborted by a panic: {0}")]
    JobPanicked(String),

    /// A message could not be shaped into or parsed as a PUBLISH packet.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}

impl From<Rejected> for ClientError {
    fn from(rejected: Rejected) -> Self {
        let (error, message) = rejected.into_parts();
        Self::Rejected { error, message }
    }
}

impl ClientError {
    /// Returns `true` for lookup misses that are expected during normal
    /// operation.
    #[inline]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_miss())
    }

    /// Returns `true` if the socket can no longer be used.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::NoRuntime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let miss = ClientError::from(ExchangeError::NotFound { key: 3 });
        assert!(miss.is_miss());
        assert!(!miss.is_terminal());

        assert!(ClientError::Closed.is_terminal());
        assert!(ClientError::NoRuntime.is_terminal());
        assert!(!ClientError::Cancelled.is_terminal());
        assert!(!ClientError::JobPanicked("boom".into()).is_terminal());
        assert!(!ClientError::Exchange(ExchangeError::NotBound).is_miss());
    }

    #[test]
    fn test_rejection_keeps_message() {
        let err = ClientError::Rejected {
            error: ExchangeError::NoRoute { topic: "t".into() },
            message: Message::probe(9),
        };
        assert!(!err.is_miss());
        assert_eq!(err.to_string(), "publish rejected: topic `t` is not routed by this exchange");
    }
}
