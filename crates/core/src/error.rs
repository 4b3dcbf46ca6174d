//! Error types for the store and normalizer.
//!
//! Every variant is `Clone` so a single fetch outcome can be shared with
//! all waiters joined on the same in-flight fetch.

use tokio_rusqlite::rusqlite;

/// Errors from the durable store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Underlying database I/O failed (disk full, locked, closed connection).
    #[error("store I/O failure: {0}")]
    Io(String),

    /// A record's content hash does not match its payload.
    ///
    /// On `get` this means on-disk corruption; on `put` it means the caller
    /// handed us a record that was never normalized.
    #[error("corrupt record for key `{key}`: content hash mismatch")]
    Corruption { key: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            other => StoreError::Io(other.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors from payload normalization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NormalizeError {
    /// The payload was empty (or empty once the BOM was stripped).
    #[error("empty payload")]
    Empty,

    /// The payload failed the minimum-validity check.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corruption { key: "pkg/foo".to_string() };
        assert!(err.to_string().contains("pkg/foo"));
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn test_normalize_error_display() {
        assert_eq!(NormalizeError::Empty.to_string(), "empty payload");
    }

    #[test]
    fn test_errors_are_clone() {
        let err = StoreError::Io("disk full".to_string());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
