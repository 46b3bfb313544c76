#![allow(dead_code)]

use fibre_lifecycle::{EntryError, EvictableEntry, PolicySlot};

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A cache entry as the engine would hand it to the policy.
#[derive(Debug)]
pub struct TestEntry {
  pub key: usize,
  cached: AtomicBool,
  has_value: AtomicBool,
  pinned: AtomicBool,
  broken: AtomicBool,
  touched: AtomicBool,
  evictions: AtomicUsize,
  slot: PolicySlot,
}

impl TestEntry {
  pub fn new(key: usize) -> Arc<Self> {
    Arc::new(Self {
      key,
      cached: AtomicBool::new(true),
      has_value: AtomicBool::new(true),
      pinned: AtomicBool::new(false),
      broken: AtomicBool::new(false),
      touched: AtomicBool::new(false),
      evictions: AtomicUsize::new(0),
      slot: PolicySlot::new(),
    })
  }

  pub fn many(n: usize) -> Vec<Arc<Self>> {
    (0..n).map(Self::new).collect()
  }

  pub fn set_value(&self, has_value: bool) {
    self.has_value.store(has_value, Ordering::SeqCst);
  }

  pub fn pin(&self, pinned: bool) {
    self.pinned.store(pinned, Ordering::SeqCst);
  }

  pub fn break_value_check(&self) {
    self.broken.store(true, Ordering::SeqCst);
  }

  /// Marks the entry as removed from the cache, as the engine does before it
  /// notifies the policy.
  pub fn remove(&self) {
    self.cached.store(false, Ordering::SeqCst);
  }

  pub fn mark_touched(&self) {
    self.touched.store(true, Ordering::SeqCst);
  }

  pub fn was_touched(&self) -> bool {
    self.touched.load(Ordering::SeqCst)
  }

  pub fn evictions(&self) -> usize {
    self.evictions.load(Ordering::SeqCst)
  }
}

impl EvictableEntry for TestEntry {
  fn is_cached(&self) -> bool {
    self.cached.load(Ordering::SeqCst)
  }

  fn has_value(&self) -> Result<bool, EntryError> {
    if self.broken.load(Ordering::SeqCst) {
      return Err(EntryError::Internal("backing store unavailable".into()));
    }
    Ok(self.has_value.load(Ordering::SeqCst))
  }

  fn evict(&self) -> bool {
    if self.pinned.load(Ordering::SeqCst) {
      return false;
    }
    let evicted = self.cached.swap(false, Ordering::SeqCst);
    if evicted {
      self.evictions.fetch_add(1, Ordering::SeqCst);
    }
    evicted
  }

  fn policy_slot(&self) -> &PolicySlot {
    &self.slot
  }
}

pub fn keys(entries: &[Arc<TestEntry>]) -> Vec<usize> {
  entries.iter().map(|e| e.key).collect()
}

/// A log sink for asserting on emitted diagnostics.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
  }
}

impl io::Write for LogBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Builds a subscriber that writes plain-text logs into `buffer`.
pub fn capture_subscriber(buffer: LogBuffer) -> impl tracing::Subscriber + Send + Sync {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::TRACE)
    .with_ansi(false)
    .with_writer(move || buffer.clone())
    .finish()
}
