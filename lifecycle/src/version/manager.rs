use super::order::{Observed, SharedOrder};
use super::token::VersionToken;
use super::VersionConfig;
use crate::discovery::{
  DiscoveryEvent, DiscoveryListener, EventBus, EventKind, SubscriptionId,
};

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Issues lock and version orders for one node.
///
/// Every token returned by [`next`](Self::next) has a larger order than any
/// token previously returned by a manager sharing the same [`SharedOrder`],
/// and larger than any remote order folded in through
/// [`record_observed`](Self::record_observed).
pub struct VersionManager {
  node_id: Uuid,
  order: SharedOrder,
  last: ArcSwap<VersionToken>,
  // Present only in serializable mode.
  serial: Option<Mutex<()>>,
}

impl VersionManager {
  /// Creates a manager drawing orders from `order`.
  pub fn new(config: VersionConfig, order: SharedOrder) -> Self {
    let last = VersionToken::minted(order.current());
    debug!(
      node_id = %config.node_id,
      order = last.order(),
      serializable = config.serializable,
      "version manager started"
    );
    Self {
      node_id: config.node_id,
      order,
      last: ArcSwap::from_pointee(last),
      serial: config.serializable.then(|| Mutex::new(())),
    }
  }

  /// Creates a manager with its own counter seeded from the wall clock.
  pub fn with_config(config: VersionConfig) -> Self {
    Self::new(config, SharedOrder::from_wall_clock())
  }

  pub fn node_id(&self) -> Uuid {
    self.node_id
  }

  pub fn is_serializable(&self) -> bool {
    self.serial.is_some()
  }

  /// The counter this manager draws from.
  pub fn shared_order(&self) -> &SharedOrder {
    &self.order
  }

  /// The current value of the order counter.
  pub fn current_order(&self) -> u64 {
    self.order.current()
  }

  /// Folds an order seen on another node into the local counter.
  ///
  /// Returns `true` if the local counter moved forward.
  pub fn record_observed(&self, remote_order: u64) -> bool {
    self.merge(None, remote_order)
  }

  /// Like [`record_observed`](Self::record_observed), attributing the order to
  /// `node_id` in logs.
  pub fn record_observed_from(&self, node_id: Uuid, remote_order: u64) -> bool {
    self.merge(Some(node_id), remote_order)
  }

  /// Folds the order of a remote token into the local counter.
  pub fn record_observed_token(&self, node_id: Uuid, token: &VersionToken) -> bool {
    self.merge(Some(node_id), token.order())
  }

  /// Folds the last issued orders of the currently known remote nodes.
  pub fn sync_with_remote_nodes<I>(&self, nodes: I)
  where
    I: IntoIterator<Item = (Uuid, u64)>,
  {
    for (node_id, order) in nodes {
      if node_id != self.node_id {
        self.merge(Some(node_id), order);
      }
    }
  }

  /// Mints a new token ordered after every token this counter has issued.
  pub fn next(&self) -> VersionToken {
    match &self.serial {
      Some(lock) => {
        let _guard = lock.lock();
        self.mint()
      }
      None => self.mint(),
    }
  }

  /// Folds `remote_order`, then mints a token ordered after it.
  pub fn record_observed_and_next(&self, remote_order: u64) -> VersionToken {
    self.record_observed(remote_order);
    self.next()
  }

  /// Folds the order of a remote token, then mints a token ordered after it.
  pub fn record_observed_and_next_token(
    &self,
    node_id: Uuid,
    token: &VersionToken,
  ) -> VersionToken {
    self.record_observed_token(node_id, token);
    self.next()
  }

  /// The most recently minted token.
  ///
  /// Outside serializable mode concurrent minting may make this slightly
  /// stale.
  pub fn last_issued(&self) -> VersionToken {
    match &self.serial {
      Some(lock) => {
        let _guard = lock.lock();
        **self.last.load()
      }
      None => **self.last.load(),
    }
  }

  /// Subscribes this manager to remote metrics updates on `bus`.
  ///
  /// Pass the returned id to [`EventBus::unsubscribe`] to stop listening.
  pub fn listen(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
    let listener: Arc<dyn DiscoveryListener> = self.clone();
    bus.subscribe(listener, &[EventKind::NodeMetricsUpdated])
  }

  fn mint(&self) -> VersionToken {
    let next = VersionToken::minted(self.order.increment());
    self.last.store(Arc::new(next));
    next
  }

  fn merge(&self, node_id: Option<Uuid>, remote_order: u64) -> bool {
    if remote_order == 0 {
      return false;
    }

    match self.order.observe(remote_order) {
      Observed::Advanced { previous } => {
        debug!(
          node_id = ?node_id,
          order = remote_order,
          previous,
          "updated version order from remote node"
        );
        true
      }
      Observed::Behind { current } => {
        debug!(
          node_id = ?node_id,
          order = remote_order,
          current,
          "did not update version order (remote order is not higher)"
        );
        false
      }
    }
  }
}

impl DiscoveryListener for VersionManager {
  fn on_event(&self, event: &DiscoveryEvent) {
    if let DiscoveryEvent::NodeMetricsUpdated {
      node_id,
      last_order,
    } = *event
    {
      if node_id != self.node_id {
        self.record_observed_from(node_id, last_order);
      }
    }
  }
}

impl fmt::Debug for VersionManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VersionManager")
      .field("node_id", &self.node_id)
      .field("order", &self.order.current())
      .field("last", &**self.last.load())
      .field("serializable", &self.is_serializable())
      .finish()
  }
}
