//! Discount lookups used to enrich baskets at read time.
//!
//! # Architecture
//!
//! - [`DiscountLookup`] is the capability the basket service depends on
//! - [`HttpDiscountClient`] talks to the remote discount service
//! - [`ResilientDiscountLookup`] wraps any lookup with a per-attempt timeout,
//!   bounded retries with backoff, and a [`CircuitBreaker`]
//!
//! Lookups are read-only and idempotent, so retrying them is always safe.

mod circuit;
mod http;
mod resilient;

use std::future::Future;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::Instant;

pub use circuit::{CallPermit, CircuitBreaker, CircuitState};
pub use http::HttpDiscountClient;
pub use resilient::ResilientDiscountLookup;

/// Errors that can occur when looking up a discount.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// The deadline elapsed before a result arrived.
    #[error("discount lookup timed out")]
    Timeout,

    /// Circuit open, or retries exhausted.
    #[error("discount service unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body was not a usable discount.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DiscountError {
    /// Whether another attempt may succeed. Transient failures also count
    /// against the circuit breaker.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Unavailable(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Looks up the discount for a product by name.
pub trait DiscountLookup: Send + Sync {
    /// Discount amount for `product_name`; zero means no discount.
    ///
    /// Implementations must give up with [`DiscountError::Timeout`] once
    /// `deadline` passes.
    fn lookup(
        &self,
        product_name: &str,
        deadline: Instant,
    ) -> impl Future<Output = Result<Decimal, DiscountError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DiscountError::Timeout.is_transient());
        assert!(
            DiscountError::Api {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            DiscountError::Api {
                status: 429,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !DiscountError::Api {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!DiscountError::InvalidResponse("bad".to_string()).is_transient());
        assert!(!DiscountError::Unavailable("open".to_string()).is_transient());
    }
}
