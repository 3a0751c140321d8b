//! Cache-aside access to record collections.
//!
//! This module provides the caching policy on top of `crate::store`:
//! - A collection is an index list of keys plus one entry per member
//! - The index and every member carry the same TTL, refreshed on every hit
//! - A missing index means a cold cache, repopulated from the origin

mod repository;
mod traits;

pub use repository::{CacheError, CacheRepository, DEFAULT_TTL};
pub use traits::{CacheResult, CacheSource, Cacheable};
