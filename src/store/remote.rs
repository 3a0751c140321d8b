//! Redis transport.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

use super::{Connector, StoreConnection, StoreError, StoreResult};

impl From<RedisError> for StoreError {
  fn from(e: RedisError) -> Self {
    // Timeouts are left to the transport and are not worth a reconnect
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
      StoreError::Connection(e.to_string())
    } else {
      StoreError::Command(e.to_string())
    }
  }
}

/// Opens multiplexed connections to a Redis server.
pub struct RedisConnector {
  client: Client,
}

impl RedisConnector {
  /// Parse the connection string. No network traffic happens here.
  pub fn open(url: &str) -> StoreResult<Self> {
    let client = Client::open(url)
      .map_err(|e| StoreError::Command(format!("Invalid cache connection string: {}", e)))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Connector for RedisConnector {
  type Connection = RedisConnection;

  async fn connect(&self) -> StoreResult<RedisConnection> {
    let conn = self.client.get_multiplexed_async_connection().await?;
    Ok(RedisConnection { conn })
  }
}

#[derive(Clone)]
pub struct RedisConnection {
  conn: MultiplexedConnection,
}

fn millis(ttl: Duration) -> u64 {
  u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl StoreConnection for RedisConnection {
  async fn exists(&mut self, key: &str) -> StoreResult<bool> {
    Ok(self.conn.exists(key).await?)
  }

  async fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
    Ok(self.conn.get(key).await?)
  }

  async fn set_with_ttl(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
    let _: () = self.conn.pset_ex(key, value, millis(ttl)).await?;
    Ok(())
  }

  async fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
    let ms = i64::try_from(millis(ttl)).unwrap_or(i64::MAX);
    Ok(self.conn.pexpire(key, ms).await?)
  }

  async fn list_len(&mut self, key: &str) -> StoreResult<usize> {
    Ok(self.conn.llen(key).await?)
  }

  async fn list_index(&mut self, key: &str, index: usize) -> StoreResult<Option<String>> {
    let index = isize::try_from(index)
      .map_err(|_| StoreError::Command(format!("List index out of range: {}", index)))?;
    Ok(self.conn.lindex(key, index).await?)
  }

  async fn list_push(&mut self, key: &str, value: &str) -> StoreResult<usize> {
    Ok(self.conn.rpush(key, value).await?)
  }

  async fn ttl(&mut self, key: &str) -> StoreResult<Option<Duration>> {
    // -2 for a missing key, -1 for a key without expiry
    let ms: i64 = self.conn.pttl(key).await?;
    Ok(u64::try_from(ms).ok().map(Duration::from_millis))
  }

  async fn client_list(&mut self) -> StoreResult<Vec<String>> {
    let list: String = redis::cmd("CLIENT")
      .arg("LIST")
      .query_async(&mut self.conn)
      .await?;
    Ok(list.lines().map(str::to_string).collect())
  }

  async fn close(&mut self) -> StoreResult<()> {
    // The socket is released once the last clone is dropped
    Ok(())
  }
}
