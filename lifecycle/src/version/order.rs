use crate::time;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use once_cell::sync::Lazy;

// Opt-in process-wide counter for callers that want every manager in the
// process to share one order sequence.
static PROCESS_ORDER: Lazy<SharedOrder> = Lazy::new(SharedOrder::from_wall_clock);

/// Result of folding a remote order into a [`SharedOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
  /// The counter was raised from `previous` to the remote order.
  Advanced { previous: u64 },
  /// The counter was already at or above the remote order.
  Behind { current: u64 },
}

/// A handle to an order counter that only ever moves forward.
///
/// Clones share the same counter. Give the same handle to every
/// [`VersionManager`](super::VersionManager) whose tokens must be mutually
/// ordered.
#[derive(Clone)]
pub struct SharedOrder {
  counter: Arc<CachePadded<AtomicU64>>,
}

impl SharedOrder {
  /// Creates a counter seeded from the wall clock in milliseconds, so that a
  /// restarted node does not issue orders below those it issued before.
  pub fn from_wall_clock() -> Self {
    Self::starting_at(time::wall_clock_millis())
  }

  /// Creates a counter starting at `order`.
  pub fn starting_at(order: u64) -> Self {
    Self {
      counter: Arc::new(CachePadded::new(AtomicU64::new(order))),
    }
  }

  /// Returns a handle to the lazily created process-wide counter.
  pub fn process_wide() -> Self {
    PROCESS_ORDER.clone()
  }

  /// The current value of the counter.
  #[inline]
  pub fn current(&self) -> u64 {
    self.counter.load(Ordering::Acquire)
  }

  /// Raises the counter to `remote` if `remote` is larger. Never lowers it.
  pub fn observe(&self, remote: u64) -> Observed {
    let mut current = self.counter.load(Ordering::Acquire);
    loop {
      if remote <= current {
        return Observed::Behind { current };
      }
      match self
        .counter
        .compare_exchange_weak(current, remote, Ordering::AcqRel, Ordering::Acquire)
      {
        Ok(previous) => return Observed::Advanced { previous },
        Err(actual) => current = actual,
      }
    }
  }

  /// Advances the counter by one and returns the new value.
  ///
  /// Wraps on overflow. With a 64-bit counter seeded from milliseconds this is
  /// not reachable in practice.
  #[inline]
  pub(crate) fn increment(&self) -> u64 {
    self.counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
  }

  /// Returns `true` if both handles refer to the same counter.
  pub fn ptr_eq(&self, other: &SharedOrder) -> bool {
    Arc::ptr_eq(&self.counter, &other.counter)
  }
}

impl Default for SharedOrder {
  fn default() -> Self {
    Self::from_wall_clock()
  }
}

impl fmt::Debug for SharedOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedOrder")
      .field("current", &self.current())
      .finish()
  }
}
