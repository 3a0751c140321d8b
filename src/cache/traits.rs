//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached.
///
/// Each entity is stored under `{namespace}:{cache_id}`, and one generation
/// of a collection is tracked by a list stored under `index_key()`.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Stable identity within one collection generation (e.g., record id)
  fn cache_id(&self) -> String;

  /// Category label used as the key prefix (e.g., "record")
  fn namespace() -> &'static str;

  /// Key of the list that indexes the collection
  fn index_key() -> &'static str;

  fn cache_key(&self) -> String {
    format!("{}:{}", Self::namespace(), self.cache_id())
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was served
  pub fetched_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  /// Data freshly fetched from the origin.
  pub fn from_origin(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Origin,
      fetched_at: Utc::now(),
    }
  }

  /// Data read from the cache store.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      fetched_at: Utc::now(),
    }
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// The index existed; served from the cache store
  Cache,
  /// Cold cache; fetched from the origin and written back
  Origin,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Cache => "cache",
      Self::Origin => "origin",
    }
  }
}
