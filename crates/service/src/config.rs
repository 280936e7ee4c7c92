//! Basket service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BASKET_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `DISCOUNT_API_URL` - Base URL of the discount service
//!
//! ## Optional
//! - `DISCOUNT_API_KEY` - Bearer token for the discount service
//! - `BASKET_CACHE_TTL_SECS` - Cached basket lifetime (default: 300)
//! - `BASKET_CACHE_MAX_ENTRIES` - Most owners kept in the cache; oldest are evicted first (default: 1000)
//! - `BASKET_REQUEST_TIMEOUT_MS` - Deadline applied to each basket call (default: 2000)
//! - `DISCOUNT_TIMEOUT_MS` - Budget for all discount lookups of one read (default: 500)
//! - `DISCOUNT_REQUEST_TIMEOUT_MS` - Timeout of a single lookup attempt (default: 250)
//! - `DISCOUNT_MAX_RETRIES` - Retries after the first attempt (default: 2)
//! - `DISCOUNT_RETRY_BACKOFF_MS` - Initial retry backoff (default: 50)
//! - `DISCOUNT_RETRY_MAX_BACKOFF_MS` - Backoff ceiling (default: 1000)
//! - `DISCOUNT_CIRCUIT_FAILURE_THRESHOLD` - Consecutive failures before opening (default: 5)
//! - `DISCOUNT_CIRCUIT_SUCCESS_THRESHOLD` - Half-open successes before closing (default: 1)
//! - `DISCOUNT_CIRCUIT_COOLDOWN_SECS` - How long the circuit stays open (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Basket service configuration.
#[derive(Debug, Clone)]
pub struct BasketConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Deadline applied to each inbound basket call
    pub request_timeout: Duration,
    pub cache: CacheConfig,
    pub discount: DiscountConfig,
    pub telemetry: TelemetryConfig,
}

/// Error tracking settings. Loadable on their own so commands that never
/// touch the discount service can still report to Sentry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl TelemetryConfig {
    /// Load from `SENTRY_DSN` and `SENTRY_ENVIRONMENT`.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        }
    }
}

/// Load only the database URL, for commands such as migrations.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither `BASKET_DATABASE_URL` nor
/// `DATABASE_URL` is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("BASKET_DATABASE_URL")
}

/// Single-flight basket cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Cap on cached owners, exceeded only by populations in flight
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1000,
        }
    }
}

/// Discount service client settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct DiscountConfig {
    pub base_url: Url,
    pub api_key: Option<SecretString>,
    /// Budget for all lookups made while pricing one basket
    pub lookup_timeout: Duration,
    /// Timeout of a single HTTP attempt
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit: CircuitBreakerConfig,
}

impl std::fmt::Debug for DiscountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscountConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("lookup_timeout", &self.lookup_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("circuit", &self.circuit)
            .finish()
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a trial call
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl BasketConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the discount API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            ttl: Duration::from_secs(parse_env_or("BASKET_CACHE_TTL_SECS", defaults.ttl.as_secs())?),
            max_entries: parse_env_or("BASKET_CACHE_MAX_ENTRIES", defaults.max_entries)?,
        };

        Ok(Self {
            database_url: get_database_url("BASKET_DATABASE_URL")?,
            request_timeout: Duration::from_millis(parse_env_or("BASKET_REQUEST_TIMEOUT_MS", 2000)?),
            cache,
            discount: DiscountConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(),
        })
    }
}

impl DiscountConfig {
    /// Settings for `base_url` with every other field at its default.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            lookup_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(250),
            retry: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_required_env("DISCOUNT_API_URL")?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("DISCOUNT_API_URL".to_string(), e.to_string()))?;

        let api_key = get_optional_env("DISCOUNT_API_KEY")
            .map(|key| {
                validate_secret_strength(&key, "DISCOUNT_API_KEY")?;
                Ok::<_, ConfigError>(SecretString::from(key))
            })
            .transpose()?;

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: parse_env_or("DISCOUNT_MAX_RETRIES", retry_defaults.max_retries)?,
            initial_backoff: Duration::from_millis(parse_env_or("DISCOUNT_RETRY_BACKOFF_MS", 50)?),
            max_backoff: Duration::from_millis(parse_env_or("DISCOUNT_RETRY_MAX_BACKOFF_MS", 1000)?),
        };

        let circuit_defaults = CircuitBreakerConfig::default();
        let circuit = CircuitBreakerConfig {
            failure_threshold: parse_env_or(
                "DISCOUNT_CIRCUIT_FAILURE_THRESHOLD",
                circuit_defaults.failure_threshold,
            )?,
            success_threshold: parse_env_or(
                "DISCOUNT_CIRCUIT_SUCCESS_THRESHOLD",
                circuit_defaults.success_threshold,
            )?,
            cooldown: Duration::from_secs(parse_env_or(
                "DISCOUNT_CIRCUIT_COOLDOWN_SECS",
                circuit_defaults.cooldown.as_secs(),
            )?),
        };

        Ok(Self {
            base_url,
            api_key,
            lookup_timeout: Duration::from_millis(parse_env_or("DISCOUNT_TIMEOUT_MS", 500)?),
            request_timeout: Duration::from_millis(parse_env_or("DISCOUNT_REQUEST_TIMEOUT_MS", 250)?),
            retry,
            circuit,
        })
    }

    /// Returns the API key, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_valid() {
        let ttl: u64 = parse_value("BASKET_CACHE_TTL_SECS", " 60 ").unwrap();
        assert_eq!(ttl, 60);
    }

    #[test]
    fn test_parse_value_invalid() {
        let result: Result<u32, _> = parse_value("DISCOUNT_MAX_RETRIES", "three");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "DISCOUNT_MAX_RETRIES"
        ));
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-discount-key", "DISCOUNT_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "DISCOUNT_API_KEY");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("dk_9f8Q2mZx7LpR4tWc1vB6", "DISCOUNT_API_KEY").is_ok());
    }

    #[test]
    fn test_defaults() {
        let cache = CacheConfig::default();
        assert_eq!(cache.ttl, Duration::from_secs(300));
        assert_eq!(cache.max_entries, 1000);

        let discount = DiscountConfig::new(Url::parse("http://discounts.local").unwrap());
        assert_eq!(discount.retry.max_retries, 2);
        assert_eq!(discount.circuit.failure_threshold, 5);
        assert!(discount.api_key().is_none());
    }

    #[test]
    fn test_discount_config_debug_redacts_key() {
        let mut config = DiscountConfig::new(Url::parse("http://discounts.local").unwrap());
        config.api_key = Some(SecretString::from("dk_super_secret_value"));

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("discounts.local"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("dk_super_secret_value"));
    }
}
