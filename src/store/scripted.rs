//! Connector with injectable failures, for exercising the recovery paths.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{
  Connector, MemoryConnection, MemoryConnector, MemoryStore, StoreConnection, StoreError,
  StoreResult,
};

#[derive(Debug, Default)]
struct Script {
  connect_failures: usize,
  commands_before_failure: usize,
  command_failures: usize,
}

impl Script {
  fn next_command(&mut self) -> StoreResult<()> {
    if self.commands_before_failure > 0 {
      self.commands_before_failure -= 1;
      return Ok(());
    }
    if self.command_failures > 0 {
      self.command_failures -= 1;
      return Err(StoreError::Connection("connection reset by peer".to_string()));
    }
    Ok(())
  }
}

/// Wraps a `MemoryConnector`, failing connects and commands on demand.
#[derive(Clone)]
pub struct ScriptedConnector {
  inner: MemoryConnector,
  script: Arc<Mutex<Script>>,
  attempts: Arc<AtomicUsize>,
  gate: Option<Arc<Semaphore>>,
}

impl ScriptedConnector {
  pub fn new(store: MemoryStore) -> Self {
    Self {
      inner: MemoryConnector::new(store),
      script: Arc::new(Mutex::new(Script::default())),
      attempts: Arc::new(AtomicUsize::new(0)),
      gate: None,
    }
  }

  /// Block every connect until a permit is added to the returned gate.
  pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    self.gate = Some(Arc::clone(&gate));
    (self, gate)
  }

  /// Fail the next `count` connects.
  pub fn fail_connects(&self, count: usize) {
    self.script().connect_failures = count;
  }

  /// Let `after` commands through, then fail the next `count` with a
  /// connection error. Counts across every connection from this connector.
  pub fn fail_commands(&self, after: usize, count: usize) {
    let mut script = self.script();
    script.commands_before_failure = after;
    script.command_failures = count;
  }

  /// Connect attempts, including failed ones.
  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }

  /// Connections actually opened.
  pub fn connects(&self) -> usize {
    self.inner.connects()
  }

  fn script(&self) -> std::sync::MutexGuard<'_, Script> {
    self.script.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[async_trait]
impl Connector for ScriptedConnector {
  type Connection = ScriptedConnection;

  async fn connect(&self) -> StoreResult<ScriptedConnection> {
    self.attempts.fetch_add(1, Ordering::SeqCst);

    if let Some(gate) = &self.gate {
      gate
        .acquire()
        .await
        .map_err(|_| StoreError::Connection("gate closed".to_string()))?
        .forget();
    }

    {
      let mut script = self.script();
      if script.connect_failures > 0 {
        script.connect_failures -= 1;
        return Err(StoreError::Connection("connection refused".to_string()));
      }
    }

    Ok(ScriptedConnection {
      inner: self.inner.connect().await?,
      script: Arc::clone(&self.script),
    })
  }
}

#[derive(Clone)]
pub struct ScriptedConnection {
  inner: MemoryConnection,
  script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
  fn next_command(&self) -> StoreResult<()> {
    self
      .script
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .next_command()
  }
}

#[async_trait]
impl StoreConnection for ScriptedConnection {
  async fn exists(&mut self, key: &str) -> StoreResult<bool> {
    self.next_command()?;
    self.inner.exists(key).await
  }

  async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
    self.next_command()?;
    self.inner.get(key).await
  }

  async fn set_with_ttl(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
    self.next_command()?;
    self.inner.set_with_ttl(key, value, ttl).await
  }

  async fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
    self.next_command()?;
    self.inner.expire(key, ttl).await
  }

  async fn list_len(&mut self, key: &str) -> StoreResult<usize> {
    self.next_command()?;
    self.inner.list_len(key).await
  }

  async fn list_index(&mut self, key: &str, index: usize) -> StoreResult<Option<String>> {
    self.next_command()?;
    self.inner.list_index(key, index).await
  }

  async fn list_push(&mut self, key: &str, value: &str) -> StoreResult<usize> {
    self.next_command()?;
    self.inner.list_push(key, value).await
  }

  async fn ttl(&mut self, key: &str) -> StoreResult<Option<Duration>> {
    self.next_command()?;
    self.inner.ttl(key).await
  }

  async fn client_list(&mut self) -> StoreResult<Vec<String>> {
    self.next_command()?;
    self.inner.client_list().await
  }

  async fn close(&mut self) -> StoreResult<()> {
    self.inner.close().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_connect_failures_then_success() {
    let connector = ScriptedConnector::new(MemoryStore::new());
    connector.fail_connects(2);

    assert!(connector.connect().await.is_err());
    assert!(connector.connect().await.is_err());
    assert!(connector.connect().await.is_ok());

    assert_eq!(connector.attempts(), 3);
    assert_eq!(connector.connects(), 1);
  }

  #[tokio::test]
  async fn test_command_failures_after_skip() {
    let connector = ScriptedConnector::new(MemoryStore::new());
    let mut conn = connector.connect().await.unwrap();
    connector.fail_commands(1, 1);

    assert!(conn.exists("k").await.is_ok());
    assert!(matches!(
      conn.exists("k").await,
      Err(StoreError::Connection(_))
    ));
    assert!(conn.exists("k").await.is_ok());
  }
}
