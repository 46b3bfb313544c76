use super::{QueuePolicy, TouchOrder};

/// First-In, First-Out ordering: an entry keeps the queue position of its
/// first touch, and later accesses do not move it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl TouchOrder for Fifo {
  const NAME: &'static str = "fifo";
  const REQUEUE_ON_HIT: bool = false;
}

/// An eviction policy that evicts entries in the order they were first
/// touched.
pub type FifoPolicy<E> = QueuePolicy<E, Fifo>;
