//! Configuration for ChunkMap
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ChunkMapError, Result};
use crate::wal::Operation;

/// Main configuration for a ChunkMap instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Journal file holding both the chunk and the column trees.
    /// If this points at a directory, `cubes.dim0.db` inside it is used.
    pub storage_path: PathBuf,

    /// Rewrite the journal as a compact snapshot on open when it holds
    /// superseded entries
    pub compact_on_open: bool,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// How long the accept loop waits before re-checking the shutdown signal (milliseconds)
    pub accept_poll_interval_ms: u64,

    /// Pause between signalling shutdown and closing connections (milliseconds)
    pub shutdown_grace_ms: u64,

    /// Shut down each connection's socket on server stop, so idle peers
    /// cannot hold a connection open
    pub force_close_on_shutdown: bool,

    /// Disable Nagle's algorithm on accepted sockets
    pub tcp_nodelay: bool,

    /// Largest blob a save request may carry (bytes)
    pub max_blob_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./chunkmap_data"),
            compact_on_open: true,
            listen_addr: "0.0.0.0:25566".to_string(),
            accept_poll_interval_ms: 100,
            shutdown_grace_ms: 1000,
            force_close_on_shutdown: false,
            tcp_nodelay: true,
            max_blob_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make the server misbehave
    pub fn validate(&self) -> Result<()> {
        if self.accept_poll_interval_ms == 0 {
            return Err(ChunkMapError::Config(
                "accept poll interval must be non-zero".to_string(),
            ));
        }
        if self.max_blob_size == 0 {
            return Err(ChunkMapError::Config(
                "max blob size must be non-zero".to_string(),
            ));
        }
        // every accepted save must be committable as a single journal entry
        let journal_limit = Operation::max_put_value_len()?;
        if self.max_blob_size > journal_limit {
            return Err(ChunkMapError::Config(format!(
                "max blob size {} exceeds the journal entry limit of {} bytes",
                self.max_blob_size, journal_limit
            )));
        }
        Ok(())
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage path (journal file or directory)
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Enable or disable journal compaction on open
    pub fn compact_on_open(mut self, enabled: bool) -> Self {
        self.config.compact_on_open = enabled;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the accept poll interval (in milliseconds)
    pub fn accept_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_interval_ms = ms;
        self
    }

    /// Set the shutdown grace period (in milliseconds)
    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    pub fn force_close_on_shutdown(mut self, enabled: bool) -> Self {
        self.config.force_close_on_shutdown = enabled;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.config.tcp_nodelay = enabled;
        self
    }

    /// Set the maximum blob size (in bytes)
    pub fn max_blob_size(mut self, size: usize) -> Self {
        self.config.max_blob_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
