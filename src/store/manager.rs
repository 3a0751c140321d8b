//! Shared connection handle with throttled, threshold-gated reconnects.
//!
//! The store client normally recovers from network blips on its own, so a
//! reconnect is only forced when errors have been reported for a sustained
//! period and are still being reported. Reconnects are also rate limited, so
//! a burst of failing callers replaces the handle at most once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Connector, StoreConnection, StoreError, StoreResult};

/// Timing knobs for `ConnectionManager::force_reconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
  /// Minimum time between two actual reconnects
  pub min_frequency: Duration,
  /// How long errors must persist, and how recent the last one must be
  pub error_threshold: Duration,
}

impl Default for ReconnectPolicy {
  fn default() -> Self {
    Self {
      min_frequency: Duration::from_secs(60),
      error_threshold: Duration::from_secs(30),
    }
  }
}

/// A live connection. Becomes stale once a reconnect or shutdown closes it.
pub struct Handle<C> {
  connection: C,
  closed: AtomicBool,
}

impl<C: StoreConnection> Handle<C> {
  fn new(connection: C) -> Self {
    Self {
      connection,
      closed: AtomicBool::new(false),
    }
  }

  /// A connection to run commands on.
  pub fn connection(&self) -> StoreResult<C> {
    if self.closed.load(Ordering::SeqCst) {
      return Err(StoreError::StaleHandle);
    }
    Ok(self.connection.clone())
  }

  async fn close(&self) -> StoreResult<()> {
    if self.closed.swap(true, Ordering::SeqCst) {
      return Ok(());
    }
    self.connection.clone().close().await
  }
}

/// One armed handle; constructed at most once, on first use.
type Slot<C> = Arc<OnceCell<Arc<Handle<C>>>>;

#[derive(Debug, Default)]
struct ErrorWindow {
  first: Option<Instant>,
  previous: Option<Instant>,
}

/// Owns the single connection to the cache store.
///
/// Constructed once by the application and shared by `Arc`.
pub struct ConnectionManager<K: Connector> {
  connector: K,
  policy: ReconnectPolicy,
  slot: RwLock<Option<Slot<K::Connection>>>,
  errors: AsyncMutex<ErrorWindow>,
  last_reconnect: Mutex<Option<Instant>>,
  reconnects: AtomicU64,
}

impl<K: Connector> ConnectionManager<K> {
  pub fn new(connector: K) -> Self {
    Self {
      connector,
      policy: ReconnectPolicy::default(),
      slot: RwLock::new(None),
      errors: AsyncMutex::new(ErrorWindow::default()),
      last_reconnect: Mutex::new(None),
      reconnects: AtomicU64::new(0),
    }
  }

  pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
    self.policy = policy;
    self
  }

  #[cfg(test)]
  pub fn connector(&self) -> &K {
    &self.connector
  }

  /// Arm the lazy handle. The connection itself opens on first use.
  pub fn initialize(&self) {
    let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
      *slot = Some(Arc::new(OnceCell::new()));
    }
  }

  /// Close the current handle. Safe to call without `initialize`.
  pub async fn uninitialize(&self) {
    let old = self
      .slot
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();

    if let Some(old) = old {
      close_slot(&old).await;
    }
  }

  /// The live handle, connecting on first call.
  pub async fn get_handle(&self) -> StoreResult<Arc<Handle<K::Connection>>> {
    let slot = self
      .slot
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .ok_or(StoreError::NotInitialized)?;

    let handle = slot
      .get_or_try_init(|| async {
        debug!("opening cache store connection");
        let connection = self.connector.connect().await?;
        Ok::<_, StoreError>(Arc::new(Handle::new(connection)))
      })
      .await?;
    let handle = Arc::clone(handle);

    // A reconnect or shutdown that ran while we were connecting found the
    // slot still empty, so the handle built here is ours to close
    if !self.is_current(&slot) {
      close_handle(&handle).await;
    }

    Ok(handle)
  }

  fn is_current(&self, slot: &Slot<K::Connection>) -> bool {
    self
      .slot
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|current| Arc::ptr_eq(current, slot))
  }

  /// Number of times the handle has actually been replaced.
  pub fn reconnect_count(&self) -> u64 {
    self.reconnects.load(Ordering::SeqCst)
  }

  /// Report a connection error; replaces the handle if the policy allows.
  pub async fn force_reconnect(&self) {
    if self.throttled(Instant::now()) {
      return;
    }

    let mut window = self.errors.lock().await;
    let now = Instant::now();

    let Some(first) = window.first else {
      debug!("first cache store error since last reconnect");
      window.first = Some(now);
      window.previous = Some(now);
      return;
    };

    // Another caller may have reconnected while we waited for the lock
    if self.throttled(now) {
      return;
    }

    let since_first = now.saturating_duration_since(first);
    let since_previous = window
      .previous
      .map_or(Duration::ZERO, |previous| now.saturating_duration_since(previous));

    let should_reconnect = since_first >= self.policy.error_threshold
      && since_previous <= self.policy.error_threshold;

    window.previous = Some(now);

    if !should_reconnect {
      debug!(
        since_first_ms = since_first.as_millis() as u64,
        since_previous_ms = since_previous.as_millis() as u64,
        "cache store errors not yet sustained, keeping connection"
      );
      return;
    }

    window.first = None;
    window.previous = None;

    let old = {
      let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
      match slot.as_mut() {
        Some(current) => std::mem::replace(current, Arc::new(OnceCell::new())),
        None => {
          debug!("connection manager is shut down, skipping reconnect");
          return;
        }
      }
    };
    close_slot(&old).await;

    *self
      .last_reconnect
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(now);
    let count = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;

    info!(
      reconnects = count,
      errors_for_ms = since_first.as_millis() as u64,
      "forced cache store reconnect"
    );
  }

  fn throttled(&self, now: Instant) -> bool {
    self
      .last_reconnect
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some_and(|last| now.saturating_duration_since(last) < self.policy.min_frequency)
  }
}

/// Close a slot's handle if it was ever constructed. A handle still being
/// constructed is closed by `get_handle` once it finishes.
async fn close_slot<C: StoreConnection>(slot: &Slot<C>) {
  if let Some(handle) = slot.get() {
    close_handle(handle).await;
  }
}

/// Errors are ignored since a broken connection may fail to close.
async fn close_handle<C: StoreConnection>(handle: &Handle<C>) {
  if let Err(e) = handle.close().await {
    debug!(error = %e, "ignoring error while closing cache store connection");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryConnector, MemoryStore, ScriptedConnector};

  fn manager() -> ConnectionManager<MemoryConnector> {
    let manager = ConnectionManager::new(MemoryConnector::new(MemoryStore::new()));
    manager.initialize();
    manager
  }

  /// Report an error at each offset (seconds) from `start`.
  async fn errors_at(
    manager: &ConnectionManager<MemoryConnector>,
    start: Instant,
    offsets_secs: &[u64],
  ) {
    for &offset in offsets_secs {
      let at = start + Duration::from_secs(offset);
      tokio::time::advance(at.saturating_duration_since(Instant::now())).await;
      manager.force_reconnect().await;
    }
  }

  #[tokio::test]
  async fn test_get_handle_requires_initialize() {
    let manager = ConnectionManager::new(MemoryConnector::default());
    assert!(matches!(
      manager.get_handle().await,
      Err(StoreError::NotInitialized)
    ));
  }

  #[tokio::test]
  async fn test_initialize_is_lazy_and_connects_once() {
    let manager = manager();
    assert_eq!(manager.connector().connects(), 0);

    let first = manager.get_handle().await.unwrap();
    let second = manager.get_handle().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.connector().connects(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_first_access_connects_once() {
    let manager = Arc::new(manager());

    let handles = futures::future::join_all((0..16).map(|_| {
      let manager = Arc::clone(&manager);
      tokio::spawn(async move { manager.get_handle().await.map(|_| ()) })
    }))
    .await;

    assert!(handles.into_iter().all(|h| matches!(h, Ok(Ok(())))));
    assert_eq!(manager.connector().connects(), 1);
  }

  #[tokio::test]
  async fn test_uninitialize_without_initialize_is_noop() {
    let manager = ConnectionManager::new(MemoryConnector::default());
    manager.uninitialize().await;
    assert_eq!(manager.connector().connects(), 0);
  }

  #[tokio::test]
  async fn test_uninitialize_closes_handle() {
    let manager = manager();
    let handle = manager.get_handle().await.unwrap();

    manager.uninitialize().await;

    assert!(matches!(handle.connection(), Err(StoreError::StaleHandle)));
    assert!(matches!(
      manager.get_handle().await,
      Err(StoreError::NotInitialized)
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_single_error_does_not_reconnect() {
    let manager = manager();
    let start = Instant::now();
    errors_at(&manager, start, &[0]).await;
    assert_eq!(manager.reconnect_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_error_streak_does_not_reconnect() {
    let manager = manager();
    let start = Instant::now();
    // Isolated error, then nothing for longer than the threshold
    errors_at(&manager, start, &[0, 45]).await;
    assert_eq!(manager.reconnect_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_short_error_streak_does_not_reconnect() {
    let manager = manager();
    let start = Instant::now();
    errors_at(&manager, start, &[0, 10, 20, 29]).await;
    assert_eq!(manager.reconnect_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sustained_error_streak_reconnects_once() {
    let manager = manager();
    let start = Instant::now();
    let old = manager.get_handle().await.unwrap();

    errors_at(&manager, start, &[0, 10, 20, 30]).await;

    assert_eq!(manager.reconnect_count(), 1);
    assert!(matches!(old.connection(), Err(StoreError::StaleHandle)));

    // The replacement is lazy: connects on next use
    assert_eq!(manager.connector().connects(), 1);
    let new = manager.get_handle().await.unwrap();
    assert!(!Arc::ptr_eq(&old, &new));
    assert!(new.connection().is_ok());
    assert_eq!(manager.connector().connects(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnects_are_throttled() {
    let manager = manager();
    let start = Instant::now();
    errors_at(&manager, start, &[0, 10, 20, 30]).await;
    assert_eq!(manager.reconnect_count(), 1);

    // Another sustained streak inside the 60 second window is ignored
    errors_at(&manager, start, &[31, 41, 61, 71, 89]).await;
    assert_eq!(manager.reconnect_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_allowed_again_after_min_frequency() {
    let manager = manager();
    let start = Instant::now();
    errors_at(&manager, start, &[0, 10, 20, 30]).await;

    // Window opens at 90s; the streak must start over
    errors_at(&manager, start, &[90, 100, 110, 120]).await;
    assert_eq!(manager.reconnect_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_callers_reconnect_once() {
    let manager = Arc::new(manager());
    manager.force_reconnect().await;
    tokio::time::advance(Duration::from_secs(30)).await;

    futures::future::join_all((0..8).map(|_| {
      let manager = Arc::clone(&manager);
      async move { manager.force_reconnect().await }
    }))
    .await;

    assert_eq!(manager.reconnect_count(), 1);
  }

  /// Reconnects on the second error report.
  fn eager() -> ReconnectPolicy {
    ReconnectPolicy {
      min_frequency: Duration::from_secs(60),
      error_threshold: Duration::ZERO,
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_after_uninitialize_does_not_rearm() {
    let manager = manager().with_policy(eager());
    manager.get_handle().await.unwrap();
    manager.uninitialize().await;

    manager.force_reconnect().await;
    manager.force_reconnect().await;

    assert!(matches!(
      manager.get_handle().await,
      Err(StoreError::NotInitialized)
    ));
    assert_eq!(manager.connector().connects(), 1);
    assert_eq!(manager.reconnect_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_does_not_grow_client_list() {
    let store = MemoryStore::new();
    let manager =
      ConnectionManager::new(MemoryConnector::new(store.clone())).with_policy(eager());
    manager.initialize();

    manager.get_handle().await.unwrap();
    manager.force_reconnect().await;
    manager.force_reconnect().await;
    assert_eq!(manager.reconnect_count(), 1);

    let mut conn = manager.get_handle().await.unwrap().connection().unwrap();
    assert_eq!(conn.client_list().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_failed_connect_is_connection_class_and_retried_on_next_use() {
    let manager = ConnectionManager::new(ScriptedConnector::new(MemoryStore::new()));
    manager.initialize();
    manager.connector().fail_connects(1);

    let err = manager.get_handle().await.err().unwrap();
    assert_eq!(err.kind(), crate::store::FailureKind::Connection);

    assert!(manager.get_handle().await.is_ok());
    assert_eq!(manager.connector().attempts(), 2);
  }

  #[tokio::test]
  async fn test_handle_built_during_uninitialize_is_closed() {
    let store = MemoryStore::new();
    let (connector, gate) = ScriptedConnector::new(store.clone()).gated();
    let manager = Arc::new(ConnectionManager::new(connector));
    manager.initialize();

    let pending = tokio::spawn({
      let manager = Arc::clone(&manager);
      async move { manager.get_handle().await }
    });
    while manager.connector().attempts() == 0 {
      tokio::task::yield_now().await;
    }

    manager.uninitialize().await;
    gate.add_permits(1);

    let handle = pending.await.unwrap().unwrap();
    assert!(matches!(handle.connection(), Err(StoreError::StaleHandle)));

    // Only the side connection is left open
    let mut side = MemoryConnector::new(store).connect().await.unwrap();
    assert_eq!(side.client_list().await.unwrap().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_custom_policy() {
    let manager = manager().with_policy(ReconnectPolicy {
      min_frequency: Duration::from_secs(5),
      error_threshold: Duration::from_secs(2),
    });
    let start = Instant::now();

    errors_at(&manager, start, &[0, 2]).await;
    assert_eq!(manager.reconnect_count(), 1);
  }
}
