use crate::entry::EvictableEntry;
use crate::error::ConfigError;
use crate::policy::{Fifo, FifoPolicy, Lru, LruPolicy, QueuePolicy, TouchOrder};

/// Capacity settings for a queue-driven eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EvictionConfig {
  /// Maximum number of tracked entries. `None` means unbounded.
  pub max_size: Option<usize>,
  /// If `false`, entries without a value are evicted as soon as they are
  /// accessed instead of being queued.
  pub allow_empty_entries: bool,
}

impl Default for EvictionConfig {
  fn default() -> Self {
    Self {
      max_size: None,
      allow_empty_entries: true,
    }
  }
}

impl EvictionConfig {
  /// Checks the configuration without building anything.
  pub fn validate(&self) -> Result<(), ConfigError> {
    match self.max_size {
      Some(0) => Err(ConfigError::ZeroMaxSize),
      _ => Ok(()),
    }
  }
}

/// A builder for creating eviction policies.
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicyBuilder {
  config: EvictionConfig,
}

impl EvictionPolicyBuilder {
  /// Creates a new builder for an unbounded policy that allows empty entries.
  pub fn new() -> Self {
    Self::default()
  }

  /// Starts from an existing configuration.
  pub fn from_config(config: EvictionConfig) -> Self {
    Self { config }
  }

  /// Sets the maximum number of tracked entries.
  pub fn max_size(mut self, max_size: usize) -> Self {
    self.config.max_size = Some(max_size);
    self
  }

  /// Removes the capacity limit.
  pub fn unbounded(mut self) -> Self {
    self.config.max_size = None;
    self
  }

  /// Sets whether entries without a value may stay in the queue.
  pub fn allow_empty_entries(mut self, allow: bool) -> Self {
    self.config.allow_empty_entries = allow;
    self
  }

  /// The configuration built so far.
  pub fn config(&self) -> &EvictionConfig {
    &self.config
  }

  /// Builds a policy with the given touch order.
  pub fn build<E, O>(self) -> Result<QueuePolicy<E, O>, ConfigError>
  where
    E: EvictableEntry,
    O: TouchOrder,
  {
    QueuePolicy::with_config(self.config)
  }

  /// Builds a FIFO policy.
  pub fn fifo<E: EvictableEntry>(self) -> Result<FifoPolicy<E>, ConfigError> {
    self.build::<E, Fifo>()
  }

  /// Builds an LRU policy.
  pub fn lru<E: EvictableEntry>(self) -> Result<LruPolicy<E>, ConfigError> {
    self.build::<E, Lru>()
  }
}
