//! Lock type guarding each ring buffer.
//!
//! With the `loom` feature the store locks through `loom::sync::Mutex`, so
//! model tests explore the interleavings of the real store operations.

#[cfg(not(feature = "loom"))]
pub(crate) use parking_lot::Mutex;

#[cfg(feature = "loom")]
pub(crate) use self::loom_mutex::Mutex;

#[cfg(feature = "loom")]
mod loom_mutex {
    use std::fmt;
    use std::sync::PoisonError;

    /// `loom::sync::Mutex` behind parking_lot's non-poisoning `lock`.
    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T> fmt::Debug for Mutex<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Mutex").finish_non_exhaustive()
        }
    }
}
