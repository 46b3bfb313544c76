use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

/// The kinds of discovery events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// A node published fresh metrics, including its last issued order.
  NodeMetricsUpdated,
  /// The local node was cut off from the rest of the cluster.
  NodeSegmented,
  /// The local node rejoined the cluster after a segmentation.
  NodeReconnected,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventKind::NodeMetricsUpdated => write!(f, "node metrics updated"),
      EventKind::NodeSegmented => write!(f, "node segmented"),
      EventKind::NodeReconnected => write!(f, "node reconnected"),
    }
  }
}

/// An event delivered by the cluster discovery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
  NodeMetricsUpdated { node_id: Uuid, last_order: u64 },
  NodeSegmented { node_id: Uuid },
  NodeReconnected { node_id: Uuid },
}

impl DiscoveryEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      DiscoveryEvent::NodeMetricsUpdated { .. } => EventKind::NodeMetricsUpdated,
      DiscoveryEvent::NodeSegmented { .. } => EventKind::NodeSegmented,
      DiscoveryEvent::NodeReconnected { .. } => EventKind::NodeReconnected,
    }
  }

  /// The node the event is about.
  pub fn node_id(&self) -> Uuid {
    match *self {
      DiscoveryEvent::NodeMetricsUpdated { node_id, .. }
      | DiscoveryEvent::NodeSegmented { node_id }
      | DiscoveryEvent::NodeReconnected { node_id } => node_id,
    }
  }
}

/// A callback for discovery events.
///
/// Listeners are invoked on the publishing thread and should return quickly.
pub trait DiscoveryListener: Send + Sync {
  fn on_event(&self, event: &DiscoveryEvent);
}

impl<F> DiscoveryListener for F
where
  F: Fn(&DiscoveryEvent) + Send + Sync,
{
  fn on_event(&self, event: &DiscoveryEvent) {
    self(event)
  }
}

/// Identifies a subscription on an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
  id: SubscriptionId,
  kinds: Vec<EventKind>,
  listener: Arc<dyn DiscoveryListener>,
}

/// Delivers discovery events to the listeners subscribed to their kind.
pub struct EventBus {
  subscriptions: RwLock<Vec<Subscription>>,
  next_id: AtomicU64,
}

impl EventBus {
  pub fn new() -> Self {
    Self {
      subscriptions: RwLock::new(Vec::new()),
      next_id: AtomicU64::new(1),
    }
  }

  /// Registers `listener` for events of the given kinds.
  pub fn subscribe(
    &self,
    listener: Arc<dyn DiscoveryListener>,
    kinds: &[EventKind],
  ) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self.subscriptions.write().push(Subscription {
      id,
      kinds: kinds.to_vec(),
      listener,
    });
    debug!(subscription = id.0, ?kinds, "discovery listener added");
    id
  }

  /// Removes a subscription. Returns `false` if it was not registered.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut subscriptions = self.subscriptions.write();
    let before = subscriptions.len();
    subscriptions.retain(|s| s.id != id);
    let removed = subscriptions.len() != before;
    if removed {
      debug!(subscription = id.0, "discovery listener removed");
    }
    removed
  }

  /// Delivers `event` to every matching listener and returns how many were
  /// notified. Listeners run after the bus lock has been released.
  pub fn publish(&self, event: &DiscoveryEvent) -> usize {
    let kind = event.kind();
    let targets: Vec<Arc<dyn DiscoveryListener>> = self
      .subscriptions
      .read()
      .iter()
      .filter(|s| s.kinds.contains(&kind))
      .map(|s| s.listener.clone())
      .collect();

    for listener in &targets {
      listener.on_event(event);
    }
    targets.len()
  }

  /// The number of active subscriptions.
  pub fn len(&self) -> usize {
    self.subscriptions.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for EventBus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventBus")
      .field("subscriptions", &self.len())
      .finish()
  }
}
