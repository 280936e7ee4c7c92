//! HTTP client for the discount service.
//!
//! `GET {base_url}/api/v1/discounts?productName=<name>` returns
//! `{"amount": "1.50"}`. A `404` means the product has no discount.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

use super::{DiscountError, DiscountLookup};
use crate::config::DiscountConfig;

const DISCOUNTS_PATH: &str = "api/v1/discounts";

/// Response body of a discount lookup.
#[derive(Debug, Deserialize)]
struct DiscountResponse {
    amount: Decimal,
}

/// Discount service client.
#[derive(Debug, Clone)]
pub struct HttpDiscountClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpDiscountClient {
    /// Create a new discount client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be joined, the API key is not a
    /// valid header value, or the HTTP client fails to build.
    pub fn new(config: &DiscountConfig) -> Result<Self, DiscountError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key() {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| DiscountError::InvalidResponse(format!("invalid API key format: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: discounts_endpoint(&config.base_url)?,
        })
    }
}

impl DiscountLookup for HttpDiscountClient {
    #[instrument(skip(self, deadline), fields(product = %product_name))]
    async fn lookup(&self, product_name: &str, deadline: Instant) -> Result<Decimal, DiscountError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DiscountError::Timeout);
        }

        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("productName", product_name)])
            .timeout(remaining)
            .send();

        let response = match tokio::time::timeout_at(deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_timeout() => return Err(DiscountError::Timeout),
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(DiscountError::Timeout),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No discount for product");
            return Ok(Decimal::ZERO);
        }

        let body = match tokio::time::timeout_at(deadline, response.text()).await {
            Ok(body) => body?,
            Err(_) => return Err(DiscountError::Timeout),
        };

        if !status.is_success() {
            return Err(DiscountError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        parse_discount(&body)
    }
}

/// Build the lookup endpoint from the configured base URL.
fn discounts_endpoint(base_url: &Url) -> Result<Url, DiscountError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DISCOUNTS_PATH)
        .map_err(|e| DiscountError::InvalidResponse(format!("invalid discount base URL: {e}")))
}

/// Parse and validate a discount response body.
fn parse_discount(body: &str) -> Result<Decimal, DiscountError> {
    let response: DiscountResponse = serde_json::from_str(body)
        .map_err(|e| DiscountError::InvalidResponse(e.to_string()))?;

    if response.amount.is_sign_negative() && !response.amount.is_zero() {
        return Err(DiscountError::InvalidResponse(format!(
            "negative discount amount: {}",
            response.amount
        )));
    }

    Ok(response.amount)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_discount_string_amount() {
        assert_eq!(
            parse_discount(r#"{"amount": "1.50"}"#).unwrap(),
            "1.50".parse::<Decimal>().unwrap()
        );
    }

    #[test]
    fn test_parse_discount_numeric_amount() {
        assert_eq!(
            parse_discount(r#"{"amount": 2}"#).unwrap(),
            Decimal::from(2)
        );
    }

    #[test]
    fn test_parse_discount_negative_rejected() {
        assert!(matches!(
            parse_discount(r#"{"amount": "-1"}"#),
            Err(DiscountError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_discount_garbage_rejected() {
        assert!(matches!(
            parse_discount("<html>oops</html>"),
            Err(DiscountError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let base = Url::parse("http://discounts.local/pricing").unwrap();
        assert_eq!(
            discounts_endpoint(&base).unwrap().as_str(),
            "http://discounts.local/pricing/api/v1/discounts"
        );

        let base = Url::parse("http://discounts.local/").unwrap();
        assert_eq!(
            discounts_endpoint(&base).unwrap().as_str(),
            "http://discounts.local/api/v1/discounts"
        );
    }

    #[tokio::test]
    async fn test_lookup_past_deadline_times_out_without_request() {
        let config = DiscountConfig::new(Url::parse("http://127.0.0.1:9").unwrap());
        let client = HttpDiscountClient::new(&config).unwrap();
        let deadline = Instant::now().checked_sub(Duration::from_millis(1)).unwrap();

        assert!(matches!(
            client.lookup("Widget", deadline).await,
            Err(DiscountError::Timeout)
        ));
    }
}
