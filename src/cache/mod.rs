//! Team-scoped tiered cache for reference data.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Writes every entry to memory, a durable store and a session backup
//! - Reads tiers in that order and returns the first hit
//! - Tags entries with the current scope (team) and ignores foreign-scope hits
//! - Treats storage failures and malformed entries as misses

mod layer;
mod storage;
mod traits;

pub use layer::{TieredCache, DEFAULT_MAX_AGE, DEFAULT_NAMESPACE, DEFAULT_VERSION};
pub use storage::SqliteTier;
pub use traits::{CacheTier, Cacheable};
