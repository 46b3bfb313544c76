use thiserror::Error;

/// Errors that can occur when configuring an eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
  /// The policy was configured with a maximum size of zero, which is not
  /// allowed for a bounded policy. Use `None` for an unbounded policy.
  #[error("eviction policy max size must be greater than zero")]
  ZeroMaxSize,
}

/// Errors an entry may report when the policy asks about its state.
///
/// The policy never surfaces these to its own callers. They are logged and the
/// entry is treated as holding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
  /// The entry was removed from the cache while it was being inspected.
  #[error("entry has been removed")]
  Removed,
  /// The entry could not be inspected because of an internal failure.
  #[error("entry state unavailable: {0}")]
  Internal(String),
}
