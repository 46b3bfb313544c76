use crate::error::EntryError;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Slot value meaning "no node attached". Packed handles are never zero.
const EMPTY: u64 = 0;

/// An opaque reference to a node in an eviction queue.
///
/// A handle packs the node's cell index with the cell generation it was
/// issued under. Once the node is unlinked the cell moves to a new
/// generation, so the handle stays stale forever, even if the cell is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
  #[inline]
  pub(crate) fn new(generation: u32, index: u32) -> Self {
    Self((u64::from(generation) << 32) | (u64::from(index) + 1))
  }

  #[inline]
  pub(crate) fn generation(self) -> u32 {
    (self.0 >> 32) as u32
  }

  #[inline]
  pub(crate) fn index(self) -> u32 {
    (self.0 as u32).wrapping_sub(1)
  }

  #[inline]
  fn from_raw(raw: u64) -> Option<Self> {
    (raw != EMPTY).then_some(Self(raw))
  }
}

/// The per-entry attachment point reserved for the eviction policy that
/// governs the entry.
///
/// The slot holds at most one [`NodeHandle`] in a single `AtomicU64`. Every
/// mutation is one atomic operation, so concurrent accessors of the same entry
/// always agree on which node (if any) currently represents it.
pub struct PolicySlot {
  handle: AtomicU64,
}

impl PolicySlot {
  /// Creates an empty slot.
  pub const fn new() -> Self {
    Self {
      handle: AtomicU64::new(EMPTY),
    }
  }

  /// Returns the handle currently attached, if any.
  #[inline]
  pub fn get(&self) -> Option<NodeHandle> {
    NodeHandle::from_raw(self.handle.load(Ordering::Acquire))
  }

  /// Attaches `handle` only if the slot is empty.
  ///
  /// Returns `None` when the handle was attached, or the handle that was
  /// already present (in which case the slot is left untouched).
  #[inline]
  pub fn put_if_absent(&self, handle: NodeHandle) -> Option<NodeHandle> {
    match self
      .handle
      .compare_exchange(EMPTY, handle.0, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) => None,
      Err(current) => NodeHandle::from_raw(current),
    }
  }

  /// Detaches and returns whatever handle is attached.
  #[inline]
  pub fn take(&self) -> Option<NodeHandle> {
    NodeHandle::from_raw(self.handle.swap(EMPTY, Ordering::AcqRel))
  }

  /// Detaches the attached handle only if it is `handle`.
  ///
  /// Returns `true` if the slot held `handle` and is now empty.
  #[inline]
  pub fn remove_if(&self, handle: NodeHandle) -> bool {
    self
      .handle
      .compare_exchange(handle.0, EMPTY, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }
}

impl Default for PolicySlot {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for PolicySlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PolicySlot")
      .field("handle", &self.get())
      .finish()
  }
}

/// The view of a cache entry that an eviction policy needs.
///
/// Entries are owned by the surrounding cache engine. The policy only reads
/// their state, asks the engine to evict them, and stores its own bookkeeping
/// in the entry's [`PolicySlot`].
///
/// Implementations must not call back into the policy from `evict` while
/// holding a lock that `on_entry_accessed` for the same entry would need.
pub trait EvictableEntry: Send + Sync {
  /// Returns `true` while the entry is still part of the cache.
  fn is_cached(&self) -> bool;

  /// Returns `true` if the entry currently holds a value.
  fn has_value(&self) -> Result<bool, EntryError>;

  /// Asks the cache engine to evict this entry.
  ///
  /// Returns `false` if the engine refused, e.g. because the entry is locked
  /// or was concurrently updated.
  fn evict(&self) -> bool;

  /// The slot reserved for the governing eviction policy.
  fn policy_slot(&self) -> &PolicySlot;
}
