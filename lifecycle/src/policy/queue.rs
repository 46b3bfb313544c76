use crate::entry::NodeHandle;

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;

/// Number of cells in the first table segment. Segment `k` holds
/// `FIRST_SEGMENT_LEN << k` cells.
const FIRST_SEGMENT_LEN: usize = 32;

/// Enough segments to address every `u32` cell index.
const SEGMENTS: usize = 28;

/// Dead handles tolerated in the order queue before a compaction pass runs,
/// on top of twice the number of linked nodes.
const COMPACT_SLACK: usize = 64;

/// Low bit of a cell state. The remaining bits hold the cell generation.
const LINKED: u64 = 1;

#[inline]
fn linked_state(generation: u32) -> u64 {
  (u64::from(generation) << 1) | LINKED
}

#[inline]
fn free_state(generation: u32) -> u64 {
  u64::from(generation) << 1
}

#[inline]
fn segment_len(segment: usize) -> usize {
  FIRST_SEGMENT_LEN << segment
}

// Maps a cell index to its segment and the offset inside that segment.
#[inline]
fn locate(index: u32) -> (usize, usize) {
  let bucket = index as usize / FIRST_SEGMENT_LEN + 1;
  let segment = (usize::BITS - 1 - bucket.leading_zeros()) as usize;
  let offset = index as usize - FIRST_SEGMENT_LEN * ((1 << segment) - 1);
  (segment, offset)
}

/// One node of the queue.
///
/// A cell is either free (`LINKED` clear) or holds a linked node. Unlinking
/// moves the cell to the next generation in the same CAS that clears
/// `LINKED`, so a handle of an unlinked node never matches again, even after
/// the cell is reused.
struct Cell<E> {
  state: AtomicU64,
  seq: AtomicU64,
  entry: ArcSwapOption<E>,
}

impl<E> Cell<E> {
  fn new() -> Self {
    Self {
      state: AtomicU64::new(free_state(0)),
      seq: AtomicU64::new(0),
      entry: ArcSwapOption::empty(),
    }
  }
}

/// An unbounded, lock-free FIFO sequence of entries with O(1) append,
/// O(1) unlink by handle and amortized O(1) poll from the head.
///
/// Nodes live in a segmented table of generation-tagged cells. Append order is
/// kept in a [`SegQueue`] of handles. Unlinking a node only flips its cell
/// state, leaving a dead handle behind in the order queue. Polls skip dead
/// handles, and appends compact the order queue once dead handles outnumber
/// live ones.
pub struct EvictionQueue<E> {
  segments: [AtomicPtr<Cell<E>>; SEGMENTS],
  // Cells that have never been handed out start at this index.
  next_index: AtomicU32,
  free: SegQueue<u32>,
  order: SegQueue<NodeHandle>,
  next_seq: AtomicU64,
  len: CachePadded<AtomicUsize>,
  compacting: AtomicBool,
  _cells: PhantomData<Cell<E>>,
}

impl<E> EvictionQueue<E> {
  pub fn new() -> Self {
    Self {
      segments: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
      next_index: AtomicU32::new(0),
      free: SegQueue::new(),
      order: SegQueue::new(),
      next_seq: AtomicU64::new(0),
      len: CachePadded::new(AtomicUsize::new(0)),
      compacting: AtomicBool::new(false),
      _cells: PhantomData,
    }
  }

  /// Appends `entry` at the tail and returns the handle of its new node.
  pub fn offer_last(&self, entry: Arc<E>) -> NodeHandle {
    self.compact_if_sparse();

    let index = self
      .free
      .pop()
      .unwrap_or_else(|| self.next_index.fetch_add(1, Ordering::Relaxed));
    let cell = self.cell_or_install(index);

    // The cell is free and owned by this call until it is marked linked.
    let generation = (cell.state.load(Ordering::Acquire) >> 1) as u32;
    cell.entry.store(Some(entry));
    cell
      .seq
      .store(self.next_seq.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
    self.len.fetch_add(1, Ordering::AcqRel);
    cell.state.store(linked_state(generation), Ordering::Release);

    let handle = NodeHandle::new(generation, index);
    self.order.push(handle);
    handle
  }

  /// Unlinks the node behind `handle`.
  ///
  /// Returns `false` if the node had already been unlinked.
  pub fn unlink(&self, handle: NodeHandle) -> bool {
    self.claim(handle).is_some()
  }

  /// Returns `true` while the node behind `handle` is still in the queue.
  pub fn is_linked(&self, handle: NodeHandle) -> bool {
    self.cell(handle.index()).is_some_and(|cell| {
      cell.state.load(Ordering::Acquire) == linked_state(handle.generation())
    })
  }

  /// Unlinks the oldest node and returns it along with its handle.
  pub fn poll_first(&self) -> Option<(NodeHandle, Arc<E>)> {
    loop {
      let handle = self.order.pop()?;
      if let Some(entry) = self.claim(handle) {
        return Some((handle, entry));
      }
    }
  }

  /// The number of linked nodes. May be stale under concurrent mutation.
  #[inline]
  pub fn len(&self) -> usize {
    self.len.load(Ordering::Acquire)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Copies the linked entries in append order, oldest first.
  ///
  /// Nodes appended or unlinked while the copy is taken may or may not be
  /// included.
  pub fn snapshot(&self) -> Vec<Arc<E>> {
    let allocated = self.next_index.load(Ordering::Acquire);
    let mut linked = Vec::new();

    for index in 0..allocated {
      let Some(cell) = self.cell(index) else {
        continue;
      };
      let state = cell.state.load(Ordering::Acquire);
      if state & LINKED == 0 {
        continue;
      }
      let seq = cell.seq.load(Ordering::Relaxed);
      let entry = cell.entry.load_full();
      // Skip cells unlinked or reused while they were read.
      if cell.state.load(Ordering::Acquire) != state {
        continue;
      }
      if let Some(entry) = entry {
        linked.push((seq, entry));
      }
    }

    linked.sort_unstable_by_key(|(seq, _)| *seq);
    linked.into_iter().map(|(_, entry)| entry).collect()
  }

  /// Unlinks every node and returns the drained nodes, oldest first.
  pub fn clear(&self) -> Vec<(NodeHandle, Arc<E>)> {
    let mut drained = Vec::with_capacity(self.len());
    while let Some(polled) = self.poll_first() {
      drained.push(polled);
    }
    drained
  }

  // Unlinks the node behind `handle` and hands its entry to the caller. At
  // most one caller wins for a given handle.
  fn claim(&self, handle: NodeHandle) -> Option<Arc<E>> {
    let index = handle.index();
    let generation = handle.generation();
    let cell = self.cell(index)?;

    cell
      .state
      .compare_exchange(
        linked_state(generation),
        free_state(generation.wrapping_add(1)),
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .ok()?;

    self.len.fetch_sub(1, Ordering::AcqRel);
    let entry = cell.entry.swap(None);
    self.free.push(index);
    entry
  }

  // Drops dead handles from the order queue once they make up most of it.
  // Live handles keep their relative order, but nodes appended while a pass
  // runs may end up ahead of older ones.
  fn compact_if_sparse(&self) {
    let backlog = self.order.len();
    if backlog <= COMPACT_SLACK + 2 * self.len() {
      return;
    }
    if self
      .compacting
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      return;
    }

    for _ in 0..backlog {
      match self.order.pop() {
        Some(handle) if self.is_linked(handle) => self.order.push(handle),
        Some(_) => {}
        None => break,
      }
    }

    self.compacting.store(false, Ordering::Release);
  }

  fn cell(&self, index: u32) -> Option<&Cell<E>> {
    let (segment, offset) = locate(index);
    let base = self.segments[segment].load(Ordering::Acquire);
    if base.is_null() {
      return None;
    }
    // Safety: an installed segment holds `segment_len(segment)` initialized
    // cells, `offset` is below that length, and segments are only freed when
    // the queue is dropped.
    Some(unsafe { &*base.add(offset) })
  }

  fn cell_or_install(&self, index: u32) -> &Cell<E> {
    let (segment, offset) = locate(index);
    let mut base = self.segments[segment].load(Ordering::Acquire);

    if base.is_null() {
      let len = segment_len(segment);
      let fresh: Box<[Cell<E>]> = (0..len).map(|_| Cell::new()).collect();
      let fresh = Box::into_raw(fresh) as *mut Cell<E>;

      base = match self.segments[segment].compare_exchange(
        ptr::null_mut(),
        fresh,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => fresh,
        Err(winner) => {
          // Safety: `fresh` came from `Box::into_raw` above and was never
          // published.
          drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(fresh, len)) });
          winner
        }
      };
    }

    // Safety: see `cell`.
    unsafe { &*base.add(offset) }
  }
}

impl<E> Drop for EvictionQueue<E> {
  fn drop(&mut self) {
    for (segment, slot) in self.segments.iter_mut().enumerate() {
      let base = *slot.get_mut();
      if !base.is_null() {
        // Safety: every non-null segment pointer was produced by
        // `Box::into_raw` on a slice of `segment_len(segment)` cells, and
        // `&mut self` guarantees no other reference to it is alive.
        drop(unsafe {
          Box::from_raw(ptr::slice_from_raw_parts_mut(base, segment_len(segment)))
        });
      }
    }
  }
}

impl<E> Default for EvictionQueue<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E> fmt::Debug for EvictionQueue<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EvictionQueue")
      .field("len", &self.len())
      .field("backlog", &self.order.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn order(queue: &EvictionQueue<i32>) -> Vec<i32> {
    queue.snapshot().iter().map(|e| **e).collect()
  }

  #[test]
  fn locate_spans_segments() {
    assert_eq!(locate(0), (0, 0));
    assert_eq!(locate(31), (0, 31));
    assert_eq!(locate(32), (1, 0));
    assert_eq!(locate(95), (1, 63));
    assert_eq!(locate(96), (2, 0));
    assert_eq!(locate(u32::MAX).0, SEGMENTS - 1);
  }

  #[test]
  fn new_queue_is_empty() {
    let queue = EvictionQueue::<i32>::new();
    assert!(queue.is_empty());
    assert!(order(&queue).is_empty());
    assert!(queue.poll_first().is_none(), "poll on empty queue returns None");
  }

  #[test]
  fn offer_last_appends_in_order() {
    let queue = EvictionQueue::new();
    queue.offer_last(Arc::new(1));
    queue.offer_last(Arc::new(2));
    queue.offer_last(Arc::new(3));

    assert_eq!(queue.len(), 3);
    assert_eq!(order(&queue), vec![1, 2, 3], "oldest entry should be first");
  }

  #[test]
  fn poll_first_returns_oldest() {
    let queue = EvictionQueue::new();
    let first = queue.offer_last(Arc::new(1));
    queue.offer_last(Arc::new(2));

    let (handle, entry) = queue.poll_first().unwrap();
    assert_eq!(handle, first);
    assert_eq!(*entry, 1);
    assert!(!queue.is_linked(first), "polled node is no longer linked");
    assert_eq!(order(&queue), vec![2]);
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn unlink_from_middle() {
    let queue = EvictionQueue::new();
    queue.offer_last(Arc::new(1));
    let middle = queue.offer_last(Arc::new(2));
    queue.offer_last(Arc::new(3));

    assert!(queue.unlink(middle));
    assert_eq!(order(&queue), vec![1, 3]);
    assert_eq!(queue.len(), 2);
    assert!(!queue.unlink(middle), "second unlink is a no-op");
    assert_eq!(queue.len(), 2);
  }

  #[test]
  fn poll_skips_unlinked_nodes() {
    let queue = EvictionQueue::new();
    let head = queue.offer_last(Arc::new(1));
    queue.offer_last(Arc::new(2));
    let tail = queue.offer_last(Arc::new(3));

    assert!(queue.unlink(head));
    assert!(queue.unlink(tail));
    assert_eq!(order(&queue), vec![2]);

    queue.offer_last(Arc::new(4));
    assert_eq!(order(&queue), vec![2, 4]);
    assert_eq!(*queue.poll_first().unwrap().1, 2);
    assert_eq!(*queue.poll_first().unwrap().1, 4);
    assert!(queue.poll_first().is_none());
    assert!(queue.is_empty());
  }

  #[test]
  fn stale_handle_does_not_resolve_after_cell_reuse() {
    let queue = EvictionQueue::new();
    let old = queue.offer_last(Arc::new(1));
    assert!(queue.unlink(old));

    // The freed cell is handed to the next node under a new generation.
    let new = queue.offer_last(Arc::new(2));
    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    assert!(!queue.is_linked(old));
    assert!(!queue.unlink(old), "stale handle must not unlink the new node");
    assert_eq!(order(&queue), vec![2]);
  }

  #[test]
  fn reappending_moves_entry_to_tail() {
    let queue = EvictionQueue::new();
    let first = queue.offer_last(Arc::new(1));
    queue.offer_last(Arc::new(2));
    queue.offer_last(Arc::new(3));

    assert!(queue.unlink(first));
    queue.offer_last(Arc::new(1));
    assert_eq!(order(&queue), vec![2, 3, 1]);
    assert_eq!(*queue.poll_first().unwrap().1, 2);
  }

  #[test]
  fn clear_resets_queue() {
    let queue = EvictionQueue::new();
    let h = queue.offer_last(Arc::new(1));
    queue.offer_last(Arc::new(2));

    let drained = queue.clear();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].0, h);
    assert!(queue.is_empty());
    assert!(!queue.is_linked(h));
    assert!(order(&queue).is_empty());

    let fresh = queue.offer_last(Arc::new(3));
    assert!(!queue.unlink(h), "handles from before the clear stay stale");
    assert!(queue.is_linked(fresh));
  }

  #[test]
  fn dead_handles_are_compacted() {
    let queue = EvictionQueue::new();
    let keep = queue.offer_last(Arc::new(0));

    // Churn one entry so dead handles pile up behind the kept node.
    for i in 1..=1_000 {
      let handle = queue.offer_last(Arc::new(i));
      assert!(queue.unlink(handle));
    }

    assert!(queue.order.len() <= COMPACT_SLACK + 2 * queue.len() + 1);
    assert_eq!(queue.len(), 1);
    assert!(queue.is_linked(keep));
    assert_eq!(order(&queue), vec![0]);
    assert_eq!(queue.poll_first().map(|(h, _)| h), Some(keep));
  }

  #[test]
  fn cells_are_reused() {
    let queue = EvictionQueue::new();
    for i in 0..10_000 {
      let handle = queue.offer_last(Arc::new(i));
      queue.unlink(handle);
    }
    assert_eq!(queue.next_index.load(Ordering::Relaxed), 1);
  }

  #[test]
  fn entries_are_released_on_unlink() {
    let queue = EvictionQueue::new();
    let entry = Arc::new(7);
    let handle = queue.offer_last(entry.clone());
    assert_eq!(Arc::strong_count(&entry), 2);

    queue.unlink(handle);
    assert_eq!(Arc::strong_count(&entry), 1);
  }

  #[test]
  fn concurrent_offers_and_unlinks() {
    use std::thread;

    let queue = Arc::new(EvictionQueue::new());
    let workers: Vec<_> = (0..4)
      .map(|t| {
        let queue = queue.clone();
        thread::spawn(move || {
          let handles: Vec<_> = (0..500)
            .map(|i| queue.offer_last(Arc::new(t * 1000 + i)))
            .collect();
          // Drop every other node again.
          for handle in handles.iter().step_by(2) {
            assert!(queue.unlink(*handle));
          }
          handles.into_iter().skip(1).step_by(2).collect::<Vec<_>>()
        })
      })
      .collect();

    let kept: Vec<NodeHandle> = workers
      .into_iter()
      .flat_map(|w| w.join().unwrap())
      .collect();

    assert_eq!(queue.len(), 1000);
    assert!(kept.iter().all(|h| queue.is_linked(*h)));
    assert_eq!(queue.snapshot().len(), 1000);

    let mut polled = 0;
    while queue.poll_first().is_some() {
      polled += 1;
    }
    assert_eq!(polled, 1000);
    assert!(queue.is_empty());
  }

  #[test]
  fn concurrent_polls_claim_each_node_once() {
    use std::sync::Barrier;
    use std::thread;

    let queue = Arc::new(EvictionQueue::new());
    for i in 0..2_000 {
      queue.offer_last(Arc::new(i));
    }

    let barrier = Arc::new(Barrier::new(4));
    let workers: Vec<_> = (0..4)
      .map(|_| {
        let queue = queue.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
          barrier.wait();
          let mut seen = Vec::new();
          while let Some((_, entry)) = queue.poll_first() {
            seen.push(*entry);
          }
          seen
        })
      })
      .collect();

    let mut all: Vec<i32> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
    all.sort_unstable();
    assert_eq!(all, (0..2_000).collect::<Vec<_>>());
    assert!(queue.is_empty());
  }
}
