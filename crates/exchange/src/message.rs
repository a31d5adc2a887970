//! Keyed message handles stored by the exchange.

use bytes::Bytes;

/// An opaque message handle: a protocol header, a body and a 64-bit key.
///
/// The key is set by the publisher (a timestamp in broker usage) and is the
/// only thing the store interprets. Header and body are immutable shared
/// buffers, so cloning a `Message` yields a fresh handle over the same bytes
/// and nobody holding a handle can modify what a ring buffer slot stores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    key: u64,
    header: Bytes,
    body: Bytes,
}

impl Message {
    /// Creates a message from a header and a body with key `0`.
    pub fn new(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            key: 0,
            header: header.into(),
            body: body.into(),
        }
    }

    /// Creates a zero-length message carrying only a key.
    ///
    /// Used as the query carrier on the receive path.
    pub fn probe(key: u64) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Sets the key and returns the message.
    pub fn with_key(mut self, key: u64) -> Self {
        self.key = key;
        self
    }

    /// Returns the application key.
    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Sets the application key.
    #[inline]
    pub fn set_key(&mut self, key: u64) {
        self.key = key;
    }

    /// Returns the header bytes.
    #[inline]
    pub fn header(&self) -> &Bytes {
        &self.header
    }

    /// Returns the body bytes.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Total length of header and body.
    #[inline]
    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// Returns `true` if both header and body are empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an independent copy that shares no backing storage with `self`.
    pub fn deep_copy(&self) -> Self {
        Self {
            key: self.key,
            header: Bytes::copy_from_slice(&self.header),
            body: Bytes::copy_from_slice(&self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_empty() {
        let msg = Message::probe(42);
        assert_eq!(msg.key(), 42);
        assert!(msg.is_empty());
    }

    #[test]
    fn test_deep_copy_does_not_share_storage() {
        let msg = Message::new(vec![0x30u8], b"payload".to_vec()).with_key(7);
        let copy = msg.deep_copy();

        assert_eq!(copy, msg);
        assert_ne!(copy.body().as_ptr(), msg.body().as_ptr());

        // A plain clone is a second handle over the same bytes
        let handle = msg.clone();
        assert_eq!(handle.body().as_ptr(), msg.body().as_ptr());
    }
}
