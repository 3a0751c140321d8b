//! In-process store with Redis-like semantics for the commands we use.
//!
//! Expiry is tracked on `tokio::time::Instant`, so tests running with a
//! paused clock see exact remaining TTLs.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::{Connector, StoreConnection, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
  Bytes(Vec<u8>),
  List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
  value: Value,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

/// Shared keyspace. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  entries: Arc<Mutex<HashMap<String, Entry>>>,
  /// Ids of connections that have not been closed
  clients: Arc<Mutex<BTreeSet<u64>>>,
  next_client: Arc<AtomicU64>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delete a key out-of-band.
  #[cfg(test)]
  pub fn remove(&self, key: &str) -> StoreResult<bool> {
    Ok(self.lock()?.remove(key).is_some())
  }

  fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Command(format!("Lock poisoned: {}", e)))?;

    let now = Instant::now();
    entries.retain(|_, entry| !entry.is_expired(now));

    Ok(entries)
  }

  fn clients(&self) -> StoreResult<MutexGuard<'_, BTreeSet<u64>>> {
    self
      .clients
      .lock()
      .map_err(|e| StoreError::Command(format!("Lock poisoned: {}", e)))
  }

  fn register_client(&self) -> StoreResult<u64> {
    let id = self.next_client.fetch_add(1, Ordering::SeqCst) + 1;
    self.clients()?.insert(id);
    Ok(id)
  }
}

/// Hands out connections to a `MemoryStore`, counting how many were opened.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
  store: MemoryStore,
  connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
  pub fn new(store: MemoryStore) -> Self {
    Self {
      store,
      connects: Arc::new(AtomicUsize::new(0)),
    }
  }

  #[cfg(test)]
  pub fn store(&self) -> &MemoryStore {
    &self.store
  }

  /// Number of connections opened so far.
  #[cfg(test)]
  pub fn connects(&self) -> usize {
    self.connects.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Connector for MemoryConnector {
  type Connection = MemoryConnection;

  async fn connect(&self) -> StoreResult<MemoryConnection> {
    self.connects.fetch_add(1, Ordering::SeqCst);
    Ok(MemoryConnection {
      id: self.store.register_client()?,
      store: self.store.clone(),
      closed: Arc::new(AtomicBool::new(false)),
    })
  }
}

/// One logical connection. Once closed, every clone reports `StaleHandle`.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
  id: u64,
  store: MemoryStore,
  closed: Arc<AtomicBool>,
}

impl MemoryConnection {
  fn check_open(&self) -> StoreResult<()> {
    if self.closed.load(Ordering::SeqCst) {
      return Err(StoreError::StaleHandle);
    }
    Ok(())
  }

  fn entries(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
    self.check_open()?;
    self.store.lock()
  }
}

fn wrong_type(key: &str) -> StoreError {
  StoreError::Command(format!(
    "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
    key
  ))
}

#[async_trait]
impl StoreConnection for MemoryConnection {
  async fn exists(&mut self, key: &str) -> StoreResult<bool> {
    Ok(self.entries()?.contains_key(key))
  }

  async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
    match self.entries()?.get(key) {
      None => Ok(None),
      Some(Entry {
        value: Value::Bytes(bytes),
        ..
      }) => Ok(Some(bytes.clone())),
      Some(_) => Err(wrong_type(key)),
    }
  }

  async fn set_with_ttl(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
    let entry = Entry {
      value: Value::Bytes(value.to_vec()),
      expires_at: Some(Instant::now() + ttl),
    };
    self.entries()?.insert(key.to_string(), entry);
    Ok(())
  }

  async fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
    match self.entries()?.get_mut(key) {
      Some(entry) => {
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn list_len(&mut self, key: &str) -> StoreResult<usize> {
    match self.entries()?.get(key) {
      None => Ok(0),
      Some(Entry {
        value: Value::List(items),
        ..
      }) => Ok(items.len()),
      Some(_) => Err(wrong_type(key)),
    }
  }

  async fn list_index(&mut self, key: &str, index: usize) -> StoreResult<Option<String>> {
    match self.entries()?.get(key) {
      None => Ok(None),
      Some(Entry {
        value: Value::List(items),
        ..
      }) => Ok(items.get(index).cloned()),
      Some(_) => Err(wrong_type(key)),
    }
  }

  async fn list_push(&mut self, key: &str, value: &str) -> StoreResult<usize> {
    let mut entries = self.entries()?;
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
      value: Value::List(Vec::new()),
      expires_at: None,
    });

    match &mut entry.value {
      Value::List(items) => {
        items.push(value.to_string());
        Ok(items.len())
      }
      Value::Bytes(_) => Err(wrong_type(key)),
    }
  }

  async fn ttl(&mut self, key: &str) -> StoreResult<Option<Duration>> {
    let now = Instant::now();
    Ok(
      self
        .entries()?
        .get(key)
        .and_then(|entry| entry.expires_at)
        .map(|at| at.saturating_duration_since(now)),
    )
  }

  async fn client_list(&mut self) -> StoreResult<Vec<String>> {
    self.check_open()?;
    Ok(
      self
        .store
        .clients()?
        .iter()
        .map(|id| format!("id={} addr=memory db=0", id))
        .collect(),
    )
  }

  async fn close(&mut self) -> StoreResult<()> {
    if !self.closed.swap(true, Ordering::SeqCst) {
      self.store.clients()?.remove(&self.id);
    }
    Ok(())
  }
}
