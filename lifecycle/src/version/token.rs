use std::fmt;

use uuid::Uuid;

/// A globally comparable version: a per-node monotonic order plus a random
/// tiebreak id.
///
/// Tokens compare by `order` first and by `id` second, so two tokens minted on
/// different nodes with the same order still have a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionToken {
  order: u64,
  id: Uuid,
}

impl VersionToken {
  pub fn new(order: u64, id: Uuid) -> Self {
    Self { order, id }
  }

  /// Pairs `order` with a freshly generated tiebreak id.
  pub(crate) fn minted(order: u64) -> Self {
    Self::new(order, Uuid::new_v4())
  }

  #[inline]
  pub fn order(&self) -> u64 {
    self.order
  }

  #[inline]
  pub fn id(&self) -> Uuid {
    self.id
  }
}

impl fmt::Display for VersionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.order, self.id)
  }
}
