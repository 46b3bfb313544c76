//! Cluster-wide ordering of cache operations.
//!
//! A [`VersionManager`] mints [`VersionToken`]s whose order is strictly
//! increasing on each node and is pushed past every order observed from
//! remote nodes, so older operations compare as earlier across the cluster.

mod manager;
mod order;
mod token;

pub use manager::VersionManager;
pub use order::{Observed, SharedOrder};
pub use token::VersionToken;

use uuid::Uuid;

/// Settings for a [`VersionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionConfig {
  /// The id of the local node. Discovery events about this node are ignored.
  pub node_id: Uuid,
  /// If `true`, minting and reading the last issued token are serialized so a
  /// reader never sees a token that is still being published.
  pub serializable: bool,
}

impl Default for VersionConfig {
  fn default() -> Self {
    Self {
      node_id: Uuid::new_v4(),
      serializable: false,
    }
  }
}

impl VersionConfig {
  pub fn node_id(mut self, node_id: Uuid) -> Self {
    self.node_id = node_id;
    self
  }

  pub fn serializable(mut self, serializable: bool) -> Self {
    self.serializable = serializable;
    self
  }
}
