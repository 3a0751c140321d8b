//! Cache-aside repository over the remote store.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::traits::{CacheResult, Cacheable};
use crate::origin::{OriginError, OriginSource};
use crate::store::{Connector, RetryExecutor, StoreConnection, StoreError};

/// TTL applied to the index and every member, at population and on refresh.
pub const DEFAULT_TTL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Origin(#[from] OriginError),

  #[error("failed to encode or decode cached entry {key}: {source}")]
  Codec {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Serves a collection from the cache store, repopulating from the origin
/// when the index is missing.
///
/// The index list is the source of truth for which keys belong to the
/// current generation. Members that expired before the index are dropped.
pub struct CacheRepository<K: Connector, O: OriginSource> {
  retry: RetryExecutor<K>,
  origin: O,
  ttl: Duration,
}

impl<K: Connector, O: OriginSource> CacheRepository<K, O> {
  pub fn new(retry: RetryExecutor<K>, origin: O) -> Self {
    Self {
      retry,
      origin,
      ttl: DEFAULT_TTL,
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Fetch the collection with a cache-first strategy.
  ///
  /// 1. Index exists: read every live member, then refresh all TTLs
  /// 2. Index missing: fetch from origin, write members, build the index, set its TTL
  ///
  /// Returned order is index order; sorting for display is up to the caller.
  pub async fn get_records(&self) -> Result<CacheResult<Vec<O::Item>>, CacheError> {
    let index = O::Item::index_key();

    let warm = self
      .retry
      .run(move |mut conn| async move { conn.exists(index).await })
      .await?;

    if warm {
      let keys = self.index_keys(index).await?;
      let records = self.read_members(&keys).await?;
      self.refresh(index, &keys).await?;

      debug!(
        indexed = keys.len(),
        live = records.len(),
        "served records from cache"
      );
      return Ok(CacheResult::from_cache(records));
    }

    info!("cache miss, fetching records from origin");
    let records = self.origin.fetch_all().await?;
    self.populate(index, &records).await?;

    Ok(CacheResult::from_origin(records))
  }

  async fn index_keys(&self, index: &str) -> Result<Vec<String>, CacheError> {
    let len = self
      .retry
      .run(move |mut conn| async move { conn.list_len(index).await })
      .await?;

    let mut keys = Vec::with_capacity(len);
    for position in 0..len {
      let key = self
        .retry
        .run(move |mut conn| async move { conn.list_index(index, position).await })
        .await?;

      // The list can only shrink by expiring as a whole, in which case we stop early
      match key {
        Some(key) => keys.push(key),
        None => break,
      }
    }

    Ok(keys)
  }

  async fn read_members(&self, keys: &[String]) -> Result<Vec<O::Item>, CacheError> {
    let mut records = Vec::with_capacity(keys.len());

    for key in keys {
      match self.read_member(key).await? {
        Some(record) => records.push(record),
        None => debug!(%key, "dropping expired member"),
      }
    }

    Ok(records)
  }

  async fn read_member(&self, key: &str) -> Result<Option<O::Item>, CacheError> {
    let exists = self
      .retry
      .run(move |mut conn| async move { conn.exists(key).await })
      .await?;
    if !exists {
      return Ok(None);
    }

    // May still expire between EXISTS and GET
    let payload = self
      .retry
      .run(move |mut conn| async move { conn.get(key).await })
      .await?;

    payload
      .map(|bytes| {
        serde_json::from_slice(&bytes).map_err(|source| CacheError::Codec {
          key: key.to_string(),
          source,
        })
      })
      .transpose()
  }

  async fn refresh(&self, index: &str, keys: &[String]) -> Result<(), CacheError> {
    let ttl = self.ttl;

    self
      .retry
      .run(move |mut conn| async move { conn.expire(index, ttl).await })
      .await?;

    for key in keys.iter().map(String::as_str) {
      let exists = self
        .retry
        .run(move |mut conn| async move { conn.exists(key).await })
        .await?;
      if exists {
        self
          .retry
          .run(move |mut conn| async move { conn.expire(key, ttl).await })
          .await?;
      }
    }

    Ok(())
  }

  async fn populate(&self, index: &str, records: &[O::Item]) -> Result<(), CacheError> {
    // An empty result is not cached; the next call misses again
    if records.is_empty() {
      debug!("origin returned no records, nothing to cache");
      return Ok(());
    }

    let ttl = self.ttl;

    for record in records {
      let key = record.cache_key();
      let payload = serde_json::to_vec(record).map_err(|source| CacheError::Codec {
        key: key.clone(),
        source,
      })?;

      let (key, payload) = (key.as_str(), payload.as_slice());
      self
        .retry
        .run(move |mut conn| async move { conn.set_with_ttl(key, payload, ttl).await })
        .await?;
      self
        .retry
        .run(move |mut conn| async move { conn.list_push(index, key).await })
        .await?;
    }

    self
      .retry
      .run(move |mut conn| async move { conn.expire(index, ttl).await })
      .await?;

    info!(count = records.len(), "cached records from origin");
    Ok(())
  }
}
