use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for an eviction policy.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Queue membership ---
  pub(crate) insertions: CachePadded<AtomicU64>,
  pub(crate) reorders: CachePadded<AtomicU64>,
  pub(crate) removals: CachePadded<AtomicU64>,

  // --- Races ---
  pub(crate) lost_races: CachePadded<AtomicU64>,
  pub(crate) touch_retries: CachePadded<AtomicU64>,

  // --- Eviction ---
  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) evicted_empty: CachePadded<AtomicU64>,
  pub(crate) evictions_rejected: CachePadded<AtomicU64>,
  pub(crate) shrinks: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      insertions: CachePadded::new(AtomicU64::new(0)),
      reorders: CachePadded::new(AtomicU64::new(0)),
      removals: CachePadded::new(AtomicU64::new(0)),
      lost_races: CachePadded::new(AtomicU64::new(0)),
      touch_retries: CachePadded::new(AtomicU64::new(0)),
      evicted_by_capacity: CachePadded::new(AtomicU64::new(0)),
      evicted_empty: CachePadded::new(AtomicU64::new(0)),
      evictions_rejected: CachePadded::new(AtomicU64::new(0)),
      shrinks: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      insertions: self.insertions.load(Ordering::Relaxed),
      reorders: self.reorders.load(Ordering::Relaxed),
      removals: self.removals.load(Ordering::Relaxed),
      lost_races: self.lost_races.load(Ordering::Relaxed),
      touch_retries: self.touch_retries.load(Ordering::Relaxed),
      evicted_by_capacity: self.evicted_by_capacity.load(Ordering::Relaxed),
      evicted_empty: self.evicted_empty.load(Ordering::Relaxed),
      evictions_rejected: self.evictions_rejected.load(Ordering::Relaxed),
      shrinks: self.shrinks.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of an eviction policy's metrics.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
  /// Touches that appended a new node to the queue.
  pub insertions: u64,
  /// Touches that moved an already queued node to the tail.
  pub reorders: u64,
  /// Removal notifications that detached a queued node.
  pub removals: u64,
  /// Touches that lost the attach race to a concurrent touch of the same entry.
  pub lost_races: u64,
  /// Touches that had to start over because their node was unlinked under them.
  pub touch_retries: u64,
  /// Entries evicted because the queue exceeded its maximum size.
  pub evicted_by_capacity: u64,
  /// Entries evicted because they held no value.
  pub evicted_empty: u64,
  /// Capacity evictions the cache engine refused; those entries were re-queued.
  pub evictions_rejected: u64,
  /// Number of shrink passes run.
  pub shrinks: u64,
  /// The number of seconds the policy has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("insertions", &self.insertions)
      .field("reorders", &self.reorders)
      .field("removals", &self.removals)
      .field("lost_races", &self.lost_races)
      .field("touch_retries", &self.touch_retries)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("evicted_empty", &self.evicted_empty)
      .field("evictions_rejected", &self.evictions_rejected)
      .field("shrinks", &self.shrinks)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
