//! The entry lifecycle core of a distributed in-memory cache.
//!
//! # Features
//! - **Queue-Ordered Eviction**: FIFO and LRU policies built on one shared
//!   attach/shrink protocol. Queue bookkeeping lives in a typed slot on each
//!   entry, so no side table is kept and an entry is queued at most once even
//!   under concurrent access.
//! - **Bounded Work**: a shrink pass never polls more entries than were queued
//!   when it started, and entries the cache engine refuses to evict are
//!   re-queued rather than lost.
//! - **Cluster Versioning**: a `VersionManager` mints strictly increasing
//!   version tokens and folds in orders observed on remote nodes, so older
//!   operations compare as earlier everywhere.
//! - **Observability**: `tracing` diagnostics and lock-free eviction metrics.

// Public modules that form the API
pub mod builder;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod version;

// Internal, crate-only modules
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{EvictionConfig, EvictionPolicyBuilder};
pub use discovery::{DiscoveryEvent, DiscoveryListener, EventBus, EventKind, SubscriptionId};
pub use entry::{EvictableEntry, NodeHandle, PolicySlot};
pub use error::{ConfigError, EntryError};
pub use metrics::MetricsSnapshot;
pub use policy::{EvictionPolicy, Fifo, FifoPolicy, Lru, LruPolicy, QueuePolicy, TouchOrder};
pub use version::{SharedOrder, VersionConfig, VersionManager, VersionToken};
