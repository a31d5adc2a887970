//! Configuration for exchange stores and their ring buffers.

use crate::error::ExchangeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default ring buffer capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// What a full ring buffer does with a newly admitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Evict the oldest entry and hand it back to the caller.
    #[default]
    Evict,
    /// Refuse the new message and hand it back to the caller.
    Reject,
}

/// Configuration for a single ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Overflow handling.
    pub overflow: OverflowPolicy,
    /// Enable metrics collection.
    pub enable_metrics: bool,
}

impl RingConfig {
    /// Creates a new ring configuration.
    pub const fn new(capacity: usize, overflow: OverflowPolicy, enable_metrics: bool) -> Self {
        Self {
            capacity,
            overflow,
            enable_metrics,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, OverflowPolicy::Evict, false)
    }
}

/// Configuration for an exchange store.
///
/// Deserializable from JSON, e.g.
///
/// ```json
/// {
///   "name": "exchange1",
///   "topic": "topic1",
///   "capacity": 10,
///   "buffer_names": ["ringBuffer1"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Exchange name.
    pub name: String,
    /// Topic routed into this exchange.
    pub topic: String,
    /// Capacity of every ring buffer.
    pub capacity: usize,
    /// One ring buffer is created per name.
    pub buffer_names: Vec<String>,
    /// Overflow handling for every ring buffer.
    pub overflow: OverflowPolicy,
    /// Enable per-buffer metrics.
    pub enable_metrics: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            topic: String::new(),
            capacity: DEFAULT_CAPACITY,
            buffer_names: Vec::new(),
            overflow: OverflowPolicy::Evict,
            enable_metrics: false,
        }
    }
}

impl ExchangeConfig {
    /// Creates a configuration for `name` bound to `topic` with default settings.
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Sets the ring buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Adds a ring buffer name.
    pub fn with_buffer(mut self, name: impl Into<String>) -> Self {
        self.buffer_names.push(name.into());
        self
    }

    /// Sets the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Enables or disables metrics.
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Returns the per-buffer configuration.
    pub fn ring_config(&self) -> RingConfig {
        RingConfig::new(self.capacity, self.overflow, self.enable_metrics)
    }

    /// Checks the configuration can build a store.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.capacity == 0 {
            return Err(ExchangeError::InvalidArgument(
                "capacity must be greater than zero".into(),
            ));
        }
        if self.buffer_names.is_empty() {
            return Err(ExchangeError::InvalidArgument(
                "at least one ring buffer name is required".into(),
            ));
        }
        for (i, name) in self.buffer_names.iter().enumerate() {
            if name.is_empty() {
                return Err(ExchangeError::InvalidArgument(format!(
                    "ring buffer name at index {i} is empty"
                )));
            }
            if self.buffer_names[..i].contains(name) {
                return Err(ExchangeError::InvalidArgument(format!(
                    "duplicate ring buffer name `{name}`"
                )));
            }
        }
        Ok(())
    }

    /// Parses a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ExchangeError> {
        serde_json::from_str(json)
            .map_err(|e| ExchangeError::InvalidArgument(format!("malformed exchange config: {e}")))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExchangeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExchangeError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}
