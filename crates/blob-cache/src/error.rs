//! Error types for blob cache operations

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// No blob is stored under the key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// IO error during cache operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// The lazy blob producer yielded nothing
    #[error("Producer failed for key: {0}")]
    ProducerFailed(String),

    /// The worker queue dropped the operation before completing it
    #[error("Cache queue closed: {0}")]
    QueueClosed(String),
}

impl CacheError {
    /// Whether this error is an ordinary cache miss rather than a failure
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_is_not_failure() {
        assert!(CacheError::KeyNotFound("a".to_string()).is_miss());
        assert!(!CacheError::ProducerFailed("a".to_string()).is_miss());

        let io = CacheError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!io.is_miss());
        assert!(io.to_string().starts_with("IO error"));
    }
}
