//! Backend Configuration
//!
//! ```toml
//! buffer_size = 100     # objects held in memory or in flight
//! num_workers = 5       # concurrent downloads
//! retry_limit = 3       # retries per object for non-missing errors
//! retry_wait_ms = 5000  # pause between attempts
//! ```
//!
//! `buffer_size` counts objects, not ledgers: with 64 ledgers per file a
//! buffer of 100 holds up to 6400 ledgers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedStorageBackendConfig {
    /// Maximum objects queued, downloading, or waiting to be read (default: 100)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// Concurrent download workers (default: 5)
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,

    /// Retries for a failing download before giving up (default: 3)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Wait between download attempts in milliseconds (default: 5s)
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
}

impl Default for BufferedStorageBackendConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            num_workers: default_num_workers(),
            retry_limit: default_retry_limit(),
            retry_wait_ms: default_retry_wait_ms(),
        }
    }
}

fn default_buffer_size() -> u32 {
    100
}

fn default_num_workers() -> u32 {
    5
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_wait_ms() -> u64 {
    5000 // 5 seconds
}

impl BufferedStorageBackendConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".into()));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be greater than 0".into()));
        }
        if self.num_workers > self.buffer_size {
            return Err(Error::Config(format!(
                "num_workers ({}) must not exceed buffer_size ({})",
                self.num_workers, self.buffer_size
            )));
        }
        Ok(())
    }
}
