use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::{ReconnectPolicy, RetryPolicy};

/// Name of the secret holding the cache store connection string.
pub const CONNECTION_SECRET: &str = "HEADLINES_CACHE_CONNECTION";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Custom title for header (defaults to "headlines")
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub origin: OriginConfig,
  #[serde(default)]
  pub reconnect: ReconnectConfig,
  #[serde(default)]
  pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// TTL of the index and every cached record
  #[serde(default = "default_ttl_ms")]
  pub ttl_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_ms: default_ttl_ms(),
    }
  }
}

fn default_ttl_ms() -> u64 {
  10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
  /// Simulated latency of the upstream database
  #[serde(default = "default_origin_delay_ms")]
  pub delay_ms: u64,
}

impl Default for OriginConfig {
  fn default() -> Self {
    Self {
      delay_ms: default_origin_delay_ms(),
    }
  }
}

fn default_origin_delay_ms() -> u64 {
  3_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
  #[serde(default = "default_min_frequency_secs")]
  pub min_frequency_secs: u64,
  #[serde(default = "default_error_threshold_secs")]
  pub error_threshold_secs: u64,
}

impl Default for ReconnectConfig {
  fn default() -> Self {
    Self {
      min_frequency_secs: default_min_frequency_secs(),
      error_threshold_secs: default_error_threshold_secs(),
    }
  }
}

fn default_min_frequency_secs() -> u64 {
  60
}

fn default_error_threshold_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Retries per failure class before giving up
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
    }
  }
}

fn default_max_attempts() -> u32 {
  5
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./headlines.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/headlines/config.yaml
  ///
  /// Without any file the defaults apply; only an explicit path must exist.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("headlines.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("headlines").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the cache store connection string from the environment.
  pub fn get_connection_string() -> Result<String> {
    std::env::var(CONNECTION_SECRET).map_err(|_| {
      eyre!(
        "Cache connection string not found. Set the {} environment variable \
         (e.g. redis://127.0.0.1:6379/ or memory:// for an in-process store).",
        CONNECTION_SECRET
      )
    })
  }

  pub fn title(&self) -> &str {
    self.title.as_deref().unwrap_or("headlines")
  }

  pub fn ttl(&self) -> Duration {
    Duration::from_millis(self.cache.ttl_ms)
  }

  pub fn origin_delay(&self) -> Duration {
    Duration::from_millis(self.origin.delay_ms)
  }

  pub fn reconnect_policy(&self) -> ReconnectPolicy {
    ReconnectPolicy {
      min_frequency: Duration::from_secs(self.reconnect.min_frequency_secs),
      error_threshold: Duration::from_secs(self.reconnect.error_threshold_secs),
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_connection_retries: self.retry.max_attempts,
      max_stale_retries: self.retry.max_attempts,
    }
  }
}
