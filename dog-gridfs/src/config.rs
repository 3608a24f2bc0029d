use std::time::Duration;

use crate::{GridError, GridResult};

/// Largest chunk size accepted by [`GridConfig::validate`] (16 MiB)
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Configuration for the chunk store and the upload/download pipelines
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// sqlx connection string, e.g. `sqlite://media.db` or `sqlite::memory:`
    pub database_url: String,

    /// Fixed size of every chunk except the last one of a file
    pub chunk_size: u32,

    /// Absolute max size allowed for a single file (safety guard)
    pub max_file_bytes: u64,

    /// How many chunks a download may read ahead of its consumer
    pub read_ahead_chunks: usize,

    /// Upper bound on pooled database connections (file databases only)
    pub max_connections: u32,

    /// How long an operation waits for a pooled connection
    pub acquire_timeout: Duration,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            chunk_size: 255 * 1024,
            max_file_bytes: 512 * 1024 * 1024, // 512MB
            read_ahead_chunks: 2,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl GridConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `DOG_GRIDFS_*` environment variables.
    /// Unset variables keep their defaults.
    pub fn from_env() -> GridResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> GridResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> GridResult<T> {
            raw.trim()
                .parse()
                .map_err(|_| GridError::config(format!("{} has an invalid value: {}", key, raw)))
        }

        let mut config = Self::default();

        if let Some(url) = lookup("DOG_GRIDFS_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(raw) = lookup("DOG_GRIDFS_CHUNK_SIZE") {
            config.chunk_size = parse("DOG_GRIDFS_CHUNK_SIZE", raw)?;
        }
        if let Some(raw) = lookup("DOG_GRIDFS_MAX_FILE_BYTES") {
            config.max_file_bytes = parse("DOG_GRIDFS_MAX_FILE_BYTES", raw)?;
        }
        if let Some(raw) = lookup("DOG_GRIDFS_READ_AHEAD") {
            config.read_ahead_chunks = parse("DOG_GRIDFS_READ_AHEAD", raw)?;
        }
        if let Some(raw) = lookup("DOG_GRIDFS_MAX_CONNECTIONS") {
            config.max_connections = parse("DOG_GRIDFS_MAX_CONNECTIONS", raw)?;
        }
        if let Some(raw) = lookup("DOG_GRIDFS_ACQUIRE_TIMEOUT_SECS") {
            let secs: u64 = parse("DOG_GRIDFS_ACQUIRE_TIMEOUT_SECS", raw)?;
            config.acquire_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the values the store relies on
    pub fn validate(&self) -> GridResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(GridError::config("database_url must not be empty"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(GridError::config(format!(
                "chunk_size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.read_ahead_chunks == 0 {
            return Err(GridError::config("read_ahead_chunks must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(GridError::config("max_connections must be at least 1"));
        }
        Ok(())
    }

    pub fn with_database_url<S: Into<String>>(mut self, url: S) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_chunk_size(mut self, bytes: u32) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set max file size
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    pub fn with_read_ahead(mut self, chunks: usize) -> Self {
        self.read_ahead_chunks = chunks;
        self
    }

    pub fn with_max_connections(mut self, connections: u32) -> Self {
        self.max_connections = connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// True when the database lives only as long as the pool
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}
