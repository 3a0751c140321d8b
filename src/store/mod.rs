//! Access to the remote cache store.
//!
//! This module owns everything below the cache repository:
//! - The command surface the repository is allowed to use (`StoreConnection`)
//! - A connector seam so the Redis transport can be swapped for an in-process store
//! - The connection manager that keeps one shared handle alive and throttles reconnects
//! - The retry executor that classifies failures and drives reconnects

mod manager;
mod memory;
mod remote;
mod retry;
#[cfg(test)]
mod scripted;

pub use manager::{ConnectionManager, ReconnectPolicy};
#[cfg(test)]
pub use memory::MemoryConnection;
pub use memory::{MemoryConnector, MemoryStore};
pub use remote::RedisConnector;
pub use retry::{RetryExecutor, RetryPolicy};
#[cfg(test)]
pub use scripted::ScriptedConnector;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Connection string that selects the in-process store instead of Redis.
pub const MEMORY_URL: &str = "memory://";

/// Failure classes the retry executor switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Transport could not be established or was lost
  Connection,
  /// The handle was closed by a concurrent reconnect
  StaleHandle,
  /// Anything else; never retried
  Other,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Connection => write!(f, "connection"),
      Self::StaleHandle => write!(f, "stale handle"),
      Self::Other => write!(f, "other"),
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("cache store connection failed: {0}")]
  Connection(String),

  #[error("cache store handle was closed by a reconnect")]
  StaleHandle,

  #[error("giving up after {attempts} {kind} failures")]
  RetryExhausted {
    kind: FailureKind,
    attempts: u32,
    #[source]
    source: Box<StoreError>,
  },

  #[error("connection manager is not initialized")]
  NotInitialized,

  #[error("cache store command failed: {0}")]
  Command(String),
}

impl StoreError {
  pub fn kind(&self) -> FailureKind {
    match self {
      Self::Connection(_) => FailureKind::Connection,
      Self::StaleHandle => FailureKind::StaleHandle,
      Self::RetryExhausted { .. } | Self::NotInitialized | Self::Command(_) => FailureKind::Other,
    }
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opens connections to a cache store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
  type Connection: StoreConnection;

  async fn connect(&self) -> StoreResult<Self::Connection>;
}

/// The command surface used on top of the store.
///
/// Clones share the underlying transport, so a clone is cheap and is what
/// each retried operation receives.
#[async_trait]
pub trait StoreConnection: Clone + Send + Sync + 'static {
  /// EXISTS
  async fn exists(&mut self, key: &str) -> StoreResult<bool>;

  /// GET; `None` when the key is absent.
  async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

  /// SET with a TTL (PSETEX)
  async fn set_with_ttl(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

  /// PEXPIRE; returns whether the key existed.
  async fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool>;

  /// LLEN; zero for a missing list.
  async fn list_len(&mut self, key: &str) -> StoreResult<usize>;

  /// LINDEX; `None` when the position is out of range.
  async fn list_index(&mut self, key: &str, index: usize) -> StoreResult<Option<String>>;

  /// RPUSH; creates the list on first push and returns the new length.
  async fn list_push(&mut self, key: &str, value: &str) -> StoreResult<usize>;

  /// PTTL; `None` when the key is missing or never expires.
  async fn ttl(&mut self, key: &str) -> StoreResult<Option<Duration>>;

  /// CLIENT LIST, one line per client connected to the store.
  ///
  /// A list that keeps growing across reconnects means old handles leak.
  async fn client_list(&mut self) -> StoreResult<Vec<String>>;

  /// Release the transport. Later commands on any clone may fail.
  async fn close(&mut self) -> StoreResult<()>;
}
