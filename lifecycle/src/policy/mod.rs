pub mod fifo;
pub mod lru;
pub mod queue;
pub mod queue_policy;

#[cfg(test)]
pub(crate) mod test_util;

use crate::entry::EvictableEntry;
use crate::error::ConfigError;
use crate::metrics::MetricsSnapshot;

use std::sync::Arc;

pub use fifo::{Fifo, FifoPolicy};
pub use lru::{Lru, LruPolicy};
pub use queue_policy::QueuePolicy;

/// A trait for eviction policies that track entries of a cache engine.
///
/// The engine calls [`on_entry_accessed`](Self::on_entry_accessed) on every
/// read, update and removal. The policy decides when the tracked set has grown
/// too large and asks entries to evict themselves.
pub trait EvictionPolicy<E: EvictableEntry>: Send + Sync {
  /// Notifies the policy that `entry` was read or updated (`removed == false`)
  /// or removed from the cache (`removed == true`).
  ///
  /// Safe to call from any number of threads for the same or different
  /// entries. Never fails.
  fn on_entry_accessed(&self, entry: &Arc<E>, removed: bool);

  /// Sets the maximum number of tracked entries (`None` for unbounded) and
  /// whether entries without a value may stay in the queue.
  fn configure(
    &self,
    max_size: Option<usize>,
    allow_empty_entries: bool,
  ) -> Result<(), ConfigError>;

  /// The approximate number of entries currently tracked.
  fn current_size(&self) -> usize;

  /// The tracked entries in eviction order, oldest first.
  ///
  /// This is not an atomic snapshot under concurrent mutation.
  fn snapshot_order(&self) -> Vec<Arc<E>>;

  /// A point-in-time copy of the policy's counters.
  fn metrics(&self) -> MetricsSnapshot;
}

/// Decides what happens when an entry that is already queued is touched again.
///
/// This is the only difference between the queue-driven policies: the attach,
/// detach and shrink protocol in [`QueuePolicy`] is shared.
pub trait TouchOrder: Send + Sync + 'static {
  /// A short name for logs and debug output.
  const NAME: &'static str;

  /// If `true`, a hit unlinks the entry's node and queues the entry again at
  /// the tail. If `false`, a hit leaves the queue untouched.
  const REQUEUE_ON_HIT: bool;
}
