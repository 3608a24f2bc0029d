use thiserror::Error;

/// Result type for grid storage operations
pub type GridResult<T> = Result<T, GridError>;

/// Errors that can occur while storing or serving chunked files
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("File not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    #[error("Stream error: {reason}")]
    StreamError { reason: String },

    #[error("Name collision: {namespace}/{name} is already committed")]
    NameCollision { namespace: String, name: String },

    /// The file was committed but the caller could not attach a reference to it.
    /// The file stays in the store with nothing pointing at it.
    #[error("Reference for {logical_name} failed after commit: {source}")]
    ReferenceFailed {
        logical_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl GridError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn store_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    pub fn write_failed<S: Into<String>>(reason: S) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    pub fn not_found<N: Into<String>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn stream<S: Into<String>>(reason: S) -> Self {
        Self::StreamError {
            reason: reason.into(),
        }
    }

    pub fn name_collision<N: Into<String>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self::NameCollision {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn reference_failed<S: Into<String>>(logical_name: S, error: anyhow::Error) -> Self {
        Self::ReferenceFailed {
            logical_name: logical_name.into(),
            source: error.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<sqlx::Error> for GridError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolClosed => Self::store_unavailable("connection pool is closed"),
            sqlx::Error::PoolTimedOut => {
                Self::store_unavailable("timed out acquiring a database connection")
            }
            other => Self::backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        assert!(GridError::from(sqlx::Error::PoolClosed).is_unavailable());
        assert!(GridError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(matches!(
            GridError::from(sqlx::Error::RowNotFound),
            GridError::Backend { .. }
        ));
    }

    #[test]
    fn test_reference_failed_keeps_cause() {
        let err = GridError::reference_failed("abc.png", anyhow::anyhow!("user not found"));
        let msg = err.to_string();
        assert!(msg.contains("abc.png"));
        assert!(msg.contains("user not found"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
