use super::{EvictionPolicy, TouchOrder};
use crate::builder::EvictionConfig;
use crate::entry::{EvictableEntry, NodeHandle};
use crate::error::ConfigError;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::policy::queue::EvictionQueue;

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, trace};

// `max_size` value meaning "no capacity limit".
const UNBOUNDED: usize = 0;

/// An eviction policy that keeps tracked entries in an [`EvictionQueue`] and
/// evicts from its head once the queue grows past the maximum size.
///
/// The node representing an entry is recorded in the entry's
/// [`PolicySlot`](crate::entry::PolicySlot), so no side table is needed and an
/// entry is represented in the queue at most once.
pub struct QueuePolicy<E, O> {
  queue: EvictionQueue<E>,
  max_size: AtomicUsize,
  allow_empty_entries: AtomicBool,
  metrics: Metrics,
  _order: PhantomData<fn() -> O>,
}

impl<E, O> QueuePolicy<E, O>
where
  E: EvictableEntry,
  O: TouchOrder,
{
  /// Creates an unbounded policy that allows empty entries.
  pub fn new() -> Self {
    Self {
      queue: EvictionQueue::new(),
      max_size: AtomicUsize::new(UNBOUNDED),
      allow_empty_entries: AtomicBool::new(true),
      metrics: Metrics::new(),
      _order: PhantomData,
    }
  }

  /// Creates a policy bounded to `max_size` entries. Empty entries are allowed.
  pub fn with_max_size(max_size: usize) -> Result<Self, ConfigError> {
    Self::with_config(EvictionConfig {
      max_size: Some(max_size),
      ..EvictionConfig::default()
    })
  }

  /// Creates a policy from a validated configuration.
  pub fn with_config(config: EvictionConfig) -> Result<Self, ConfigError> {
    let policy = Self::new();
    policy.configure(config.max_size, config.allow_empty_entries)?;
    Ok(policy)
  }

  /// Applies a new configuration. The two settings are validated together and
  /// nothing changes if validation fails.
  pub fn configure(
    &self,
    max_size: Option<usize>,
    allow_empty_entries: bool,
  ) -> Result<(), ConfigError> {
    let max_size = Self::encode_max_size(max_size)?;
    self.max_size.store(max_size, Ordering::Release);
    self
      .allow_empty_entries
      .store(allow_empty_entries, Ordering::Release);
    Ok(())
  }

  /// Sets the maximum number of tracked entries. `None` removes the limit.
  pub fn set_max_size(&self, max_size: Option<usize>) -> Result<(), ConfigError> {
    let max_size = Self::encode_max_size(max_size)?;
    self.max_size.store(max_size, Ordering::Release);
    Ok(())
  }

  /// The maximum number of tracked entries, or `None` if unbounded.
  pub fn max_size(&self) -> Option<usize> {
    match self.max_size.load(Ordering::Acquire) {
      UNBOUNDED => None,
      max => Some(max),
    }
  }

  /// Sets whether entries without a value may stay in the queue.
  pub fn set_allow_empty_entries(&self, allow: bool) {
    self.allow_empty_entries.store(allow, Ordering::Release);
  }

  pub fn allow_empty_entries(&self) -> bool {
    self.allow_empty_entries.load(Ordering::Acquire)
  }

  /// See [`EvictionPolicy::on_entry_accessed`].
  pub fn on_entry_accessed(&self, entry: &Arc<E>, removed: bool) {
    if removed {
      if let Some(handle) = entry.policy_slot().take() {
        if self.queue.unlink(handle) {
          Metrics::incr(&self.metrics.removals);
        }
      }
      return;
    }

    if !entry.is_cached() {
      return;
    }

    let queue_changed = if !self.allow_empty_entries() && Self::is_empty_entry(entry) {
      self.evict_empty(entry)
    } else {
      self.touch(entry)
    };

    // Shrink only if the queue grew.
    if queue_changed {
      self.shrink();
    }
  }

  /// The number of entries in the queue.
  pub fn current_size(&self) -> usize {
    self.queue.len()
  }

  /// The queued entries, oldest first.
  pub fn snapshot_order(&self) -> Vec<Arc<E>> {
    self.queue.snapshot()
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  /// Drops every node from the queue and detaches it from its entry, so a
  /// later touch queues the entry afresh. Entries are not evicted.
  pub fn clear(&self) {
    let drained = self.queue.clear();
    for (handle, entry) in &drained {
      entry.policy_slot().remove_if(*handle);
    }
    trace!(policy = O::NAME, cleared = drained.len(), "eviction queue cleared");
  }

  fn encode_max_size(max_size: Option<usize>) -> Result<usize, ConfigError> {
    match max_size {
      Some(0) => Err(ConfigError::ZeroMaxSize),
      Some(max) => Ok(max),
      None => Ok(UNBOUNDED),
    }
  }

  // Errors lean toward keeping data: an entry we cannot inspect is never
  // treated as empty.
  fn is_empty_entry(entry: &E) -> bool {
    match entry.has_value() {
      Ok(has_value) => !has_value,
      Err(err) => {
        error!(
          error = %err,
          "failed to check whether entry holds a value, treating it as non-empty"
        );
        false
      }
    }
  }

  // Evicts an entry that holds no value. Returns `true` if the queue grew
  // because the engine refused and the entry was touched instead.
  fn evict_empty(&self, entry: &Arc<E>) -> bool {
    let slot = entry.policy_slot();

    // Do not leave an empty entry lingering mid-queue.
    if let Some(handle) = slot.take() {
      self.queue.unlink(handle);
    }

    if !entry.evict() {
      return self.touch(entry);
    }

    Metrics::incr(&self.metrics.evicted_empty);

    // A concurrent touch may have attached a fresh node after the unlink.
    if let Some(handle) = slot.take() {
      if self.queue.unlink(handle) {
        trace!(policy = O::NAME, "unlinked node attached during empty eviction");
      }
    }
    false
  }

  // Makes sure `entry` is represented in the queue exactly once. Returns
  // `true` if this call appended a node for an entry that had none.
  fn touch(&self, entry: &Arc<E>) -> bool {
    let slot = entry.policy_slot();

    if let Some(handle) = slot.get() {
      // Only the thread that unlinks the old node re-queues the entry.
      if O::REQUEUE_ON_HIT && self.queue.unlink(handle) {
        slot.remove_if(handle);
        if self.attach(entry) {
          Metrics::incr(&self.metrics.reorders);
        }
      }
      return false;
    }

    if self.attach(entry) {
      Metrics::incr(&self.metrics.insertions);
      return true;
    }
    false
  }

  // Appends a node for `entry` and records it in the entry's slot. Returns
  // `true` if the node is attached, linked and the entry still cached.
  //
  // Each pass ends in one of three ways: our node is attached and linked, a
  // concurrent touch attached its node first, or our node was unlinked by a
  // concurrent shrink or removal before we could confirm it. Only the last
  // case repeats, and it requires another thread to have made progress on
  // this entry.
  fn attach(&self, entry: &Arc<E>) -> bool {
    let slot = entry.policy_slot();

    loop {
      let handle = self.queue.offer_last(entry.clone());

      if slot.put_if_absent(handle).is_some() {
        // Lost to a concurrent touch. Our node is an orphan.
        self.queue.unlink(handle);
        Metrics::incr(&self.metrics.lost_races);
        trace!(policy = O::NAME, "lost attach race, discarded orphan node");
        return false;
      }

      // Liveness is read before membership: a node still linked after this
      // read was not polled by a shrink that evicted the entry before it.
      let cached = entry.is_cached();

      if self.queue.is_linked(handle) {
        if !cached {
          // Evicted while we were attaching.
          self.discard(entry, handle);
          return false;
        }
        return true;
      }

      if !slot.remove_if(handle) || !entry.is_cached() {
        return false;
      }

      Metrics::incr(&self.metrics.touch_retries);
      trace!(policy = O::NAME, "node unlinked during touch, retrying");
    }
  }

  fn discard(&self, entry: &E, handle: NodeHandle) {
    self.queue.unlink(handle);
    entry.policy_slot().remove_if(handle);
  }

  // Polls the head until the queue is back within `max_size`. At most as many
  // entries are polled as were queued when the pass started, so concurrent
  // touches cannot keep a single pass running.
  fn shrink(&self) {
    let Some(max_size) = self.max_size() else {
      return;
    };

    Metrics::incr(&self.metrics.shrinks);
    let start_size = self.queue.len();

    for _ in 0..start_size {
      if self.queue.len() <= max_size {
        break;
      }

      let Some((handle, entry)) = self.queue.poll_first() else {
        break;
      };

      if entry.evict() {
        Metrics::incr(&self.metrics.evicted_by_capacity);
        continue;
      }

      // The engine refused (e.g. the entry is in use). Put it back at the
      // tail so it stays tracked.
      Metrics::incr(&self.metrics.evictions_rejected);
      trace!(policy = O::NAME, "eviction rejected, re-queueing entry");
      entry.policy_slot().remove_if(handle);
      self.touch(&entry);
    }
  }
}

impl<E, O> Default for QueuePolicy<E, O>
where
  E: EvictableEntry,
  O: TouchOrder,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<E, O> EvictionPolicy<E> for QueuePolicy<E, O>
where
  E: EvictableEntry,
  O: TouchOrder,
{
  fn on_entry_accessed(&self, entry: &Arc<E>, removed: bool) {
    QueuePolicy::on_entry_accessed(self, entry, removed)
  }

  fn configure(
    &self,
    max_size: Option<usize>,
    allow_empty_entries: bool,
  ) -> Result<(), ConfigError> {
    QueuePolicy::configure(self, max_size, allow_empty_entries)
  }

  fn current_size(&self) -> usize {
    QueuePolicy::current_size(self)
  }

  fn snapshot_order(&self) -> Vec<Arc<E>> {
    QueuePolicy::snapshot_order(self)
  }

  fn metrics(&self) -> MetricsSnapshot {
    QueuePolicy::metrics(self)
  }
}

impl<E, O: TouchOrder> fmt::Debug for QueuePolicy<E, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueuePolicy")
      .field("order", &O::NAME)
      .field("max_size", &self.max_size.load(Ordering::Relaxed))
      .field(
        "allow_empty_entries",
        &self.allow_empty_entries.load(Ordering::Relaxed),
      )
      .field("current_size", &self.queue.len())
      .finish_non_exhaustive()
  }
}
