//! Bounded retry around single store operations.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ConnectionManager, Connector, FailureKind, StoreError, StoreResult};

/// Retry ceilings, counted separately per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_connection_retries: u32,
  pub max_stale_retries: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_connection_retries: 5,
      max_stale_retries: 5,
    }
  }
}

/// Runs operations against the managed connection.
///
/// There is no backoff: `ConnectionManager::force_reconnect` throttles the
/// network side, and the ceilings bound the attempts per call.
pub struct RetryExecutor<K: Connector> {
  manager: Arc<ConnectionManager<K>>,
  policy: RetryPolicy,
}

impl<K: Connector> RetryExecutor<K> {
  pub fn new(manager: Arc<ConnectionManager<K>>) -> Self {
    Self {
      manager,
      policy: RetryPolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  #[cfg(test)]
  pub fn manager(&self) -> &Arc<ConnectionManager<K>> {
    &self.manager
  }

  /// Run `op` on a fresh connection, retrying connection and stale-handle
  /// failures. Each attempt fetches the handle again.
  pub async fn run<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
  where
    F: FnMut(K::Connection) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
  {
    let mut connection_failures = 0;
    let mut stale_failures = 0;

    loop {
      let error = match self.attempt(&mut op).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
      };

      match error.kind() {
        FailureKind::Connection => {
          connection_failures += 1;
          if connection_failures > self.policy.max_connection_retries {
            return Err(exhausted(FailureKind::Connection, connection_failures, error));
          }
          debug!(attempt = connection_failures, error = %error, "cache store connection failed, retrying");
          self.manager.force_reconnect().await;
        }
        FailureKind::StaleHandle => {
          stale_failures += 1;
          if stale_failures > self.policy.max_stale_retries {
            return Err(exhausted(FailureKind::StaleHandle, stale_failures, error));
          }
          debug!(attempt = stale_failures, "cache store handle replaced, retrying");
        }
        FailureKind::Other => return Err(error),
      }
    }
  }

  async fn attempt<T, F, Fut>(&self, op: &mut F) -> StoreResult<T>
  where
    F: FnMut(K::Connection) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
  {
    let handle = self.manager.get_handle().await?;
    let connection = handle.connection()?;
    op(connection).await
  }
}

impl<K: Connector> Clone for RetryExecutor<K> {
  fn clone(&self) -> Self {
    Self {
      manager: Arc::clone(&self.manager),
      policy: self.policy,
    }
  }
}

fn exhausted(kind: FailureKind, attempts: u32, last: StoreError) -> StoreError {
  warn!(%kind, attempts, error = %last, "giving up on cache store operation");
  StoreError::RetryExhausted {
    kind,
    attempts,
    source: Box::new(last),
  }
}
