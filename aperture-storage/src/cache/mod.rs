//! Per-workspace image index cache.
//!
//! A cache entry is a multi-index in-memory view over one workspace's
//! durable image records: by-id, by-tag, by-group, plus two
//! materialized orderings (the full sorted listing and the
//! grouped-collapsed listing that shows one representative per group).
//!
//! # Contract
//!
//! A workspace is either *cold* (no entry) or *warm* (an entry
//! satisfying all index invariants); there is no partially-built
//! visible state. Entries become warm only through a full rebuild from
//! the store, are maintained incrementally on create/update
//! notifications, and are destroyed whenever a rebuild or incremental
//! step cannot be trusted - the store is authoritative, the cache is
//! only an optimization.
//!
//! # Concurrency
//!
//! The registry serializes access per workspace with an `RwLock` around
//! each entry; cold-miss rebuilds are coalesced through a per-workspace
//! single-flight guard so concurrent callers share one rebuild instead
//! of stampeding the store.

pub mod entry;
pub mod maintain;
pub mod rebuild;
pub mod registry;
pub mod views;

pub use entry::CacheEntry;
pub use registry::{CacheConfig, ImageCacheRegistry};
