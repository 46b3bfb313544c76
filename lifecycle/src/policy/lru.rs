use super::{QueuePolicy, TouchOrder};

/// Least-Recently-Used ordering: every access moves the entry to the tail, so
/// the head is always the entry that has gone longest without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lru;

impl TouchOrder for Lru {
  const NAME: &'static str = "lru";
  // Only the toucher that unlinks the old node re-queues the entry. A node
  // already polled by a shrink is left to that shrink.
  const REQUEUE_ON_HIT: bool = true;
}

/// An eviction policy that evicts the least recently used entries.
pub type LruPolicy<E> = QueuePolicy<E, Lru>;
