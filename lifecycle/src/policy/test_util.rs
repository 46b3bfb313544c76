use crate::entry::{EvictableEntry, PolicySlot};
use crate::error::EntryError;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type HookFn = Box<dyn FnOnce() + Send>;

// A callback fired once, from inside one of the entry's methods.
#[derive(Default)]
struct Hook(Mutex<Option<HookFn>>);

impl Hook {
  fn set(&self, hook: HookFn) {
    *self.0.lock() = Some(hook);
  }

  fn fire(&self) {
    // Released before running so the hook may re-enter the entry.
    let hook = self.0.lock().take();
    if let Some(hook) = hook {
      hook();
    }
  }
}

impl fmt::Debug for Hook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(if self.0.lock().is_some() { "Hook(armed)" } else { "Hook" })
  }
}

/// A cache entry stand-in whose state tests can flip at will.
#[derive(Debug)]
pub(crate) struct TestEntry {
  pub(crate) key: u32,
  cached: AtomicBool,
  has_value: AtomicBool,
  pinned: AtomicBool,
  broken: AtomicBool,
  evictions: AtomicUsize,
  cached_checks: AtomicUsize,
  // Fires on the `cached_hook_at`-th call to `is_cached`.
  cached_hook_at: AtomicUsize,
  cached_hook: Hook,
  evict_hook: Hook,
  slot: PolicySlot,
}

impl TestEntry {
  pub(crate) fn new(key: u32) -> Arc<Self> {
    Arc::new(Self {
      key,
      cached: AtomicBool::new(true),
      has_value: AtomicBool::new(true),
      pinned: AtomicBool::new(false),
      broken: AtomicBool::new(false),
      evictions: AtomicUsize::new(0),
      cached_checks: AtomicUsize::new(0),
      cached_hook_at: AtomicUsize::new(0),
      cached_hook: Hook::default(),
      evict_hook: Hook::default(),
      slot: PolicySlot::new(),
    })
  }

  pub(crate) fn empty(key: u32) -> Arc<Self> {
    let entry = Self::new(key);
    entry.set_value(false);
    entry
  }

  pub(crate) fn set_value(&self, has_value: bool) {
    self.has_value.store(has_value, Ordering::SeqCst);
  }

  pub(crate) fn pin(&self, pinned: bool) {
    self.pinned.store(pinned, Ordering::SeqCst);
  }

  pub(crate) fn break_value_check(&self) {
    self.broken.store(true, Ordering::SeqCst);
  }

  pub(crate) fn evictions(&self) -> usize {
    self.evictions.load(Ordering::SeqCst)
  }

  /// Runs `hook` inside the `nth` call to `is_cached`, counting from 1, before
  /// the call reads the flag.
  pub(crate) fn on_cached_check(&self, nth: usize, hook: impl FnOnce() + Send + 'static) {
    self.cached_checks.store(0, Ordering::SeqCst);
    self.cached_hook_at.store(nth, Ordering::SeqCst);
    self.cached_hook.set(Box::new(hook));
  }

  /// Runs `hook` at the start of the next `evict` call.
  pub(crate) fn before_evict(&self, hook: impl FnOnce() + Send + 'static) {
    self.evict_hook.set(Box::new(hook));
  }
}

impl EvictableEntry for TestEntry {
  fn is_cached(&self) -> bool {
    let call = self.cached_checks.fetch_add(1, Ordering::SeqCst) + 1;
    if call == self.cached_hook_at.load(Ordering::SeqCst) {
      self.cached_hook.fire();
    }
    self.cached.load(Ordering::SeqCst)
  }

  fn has_value(&self) -> Result<bool, EntryError> {
    if self.broken.load(Ordering::SeqCst) {
      return Err(EntryError::Internal("value check failed".into()));
    }
    Ok(self.has_value.load(Ordering::SeqCst))
  }

  fn evict(&self) -> bool {
    self.evict_hook.fire();
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

pub(crate) fn keys<E: std::ops::Deref<Target = TestEntry>>(entries: &[E]) -> Vec<u32> {
  entries.iter().map(|e| e.key).collect()
}
