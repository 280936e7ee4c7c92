//! Unified error type returned at the basket service boundary.
//!
//! `BasketError` is `Clone` because one populate failure is handed to every
//! caller waiting on the same cache key. Component errors (`StoreError`,
//! `DiscountError`) are converted into it by kind, keeping their message.

use thiserror::Error;

use crate::cache::DeadlineExceeded;
use crate::store::StoreError;

/// Errors surfaced to callers of [`BasketService`](crate::BasketService).
///
/// "No basket stored" is never an error here; it is returned as an empty
/// basket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BasketError {
    /// Caller supplied an invalid owner or item.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A deadline elapsed before the operation completed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The basket store could not be reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Unexpected store fault or corrupt stored data.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BasketError {
    /// Whether the same call may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl From<DeadlineExceeded> for BasketError {
    fn from(_: DeadlineExceeded) -> Self {
        Self::Timeout("deadline elapsed".to_string())
    }
}

impl From<StoreError> for BasketError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Database(db) => match db {
                sqlx::Error::PoolTimedOut => Self::Timeout(err.to_string()),
                sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                    Self::Unavailable(err.to_string())
                }
                _ => Self::Internal(err.to_string()),
            },
            StoreError::DataCorruption(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Result type alias for `BasketError`.
pub type Result<T> = std::result::Result<T, BasketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basket_error_display() {
        let err = BasketError::InvalidArgument("quantity must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid argument: quantity must be at least 1");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(BasketError::Timeout("t".to_string()).is_retryable());
        assert!(BasketError::Unavailable("u".to_string()).is_retryable());
        assert!(!BasketError::Internal("i".to_string()).is_retryable());
        assert!(!BasketError::InvalidArgument("a".to_string()).is_retryable());
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            BasketError::from(StoreError::Database(sqlx::Error::PoolTimedOut)),
            BasketError::Timeout(_)
        ));
        assert!(matches!(
            BasketError::from(StoreError::Database(sqlx::Error::PoolClosed)),
            BasketError::Unavailable(_)
        ));
        assert!(matches!(
            BasketError::from(StoreError::Database(sqlx::Error::RowNotFound)),
            BasketError::Internal(_)
        ));
        assert!(matches!(
            BasketError::from(StoreError::DataCorruption("bad row".to_string())),
            BasketError::Internal(_)
        ));
    }

    #[test]
    fn test_deadline_maps_to_timeout() {
        assert!(matches!(
            BasketError::from(DeadlineExceeded),
            BasketError::Timeout(_)
        ));
    }
}
