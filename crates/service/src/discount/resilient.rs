//! Timeout, retry and circuit-breaking around a [`DiscountLookup`].

use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::{CircuitBreaker, DiscountError, DiscountLookup};
use crate::config::{DiscountConfig, RetryConfig};

/// A [`DiscountLookup`] that bounds every attempt, retries transient failures
/// with jittered exponential backoff, and fails fast while the circuit is
/// open or a half-open trial is already running.
///
/// No attempt and no backoff sleep extends past the caller's deadline.
#[derive(Debug)]
pub struct ResilientDiscountLookup<D> {
    inner: D,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl<D: DiscountLookup> ResilientDiscountLookup<D> {
    pub fn new(inner: D, config: &DiscountConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config.circuit),
            retry: config.retry,
            request_timeout: config.request_timeout,
        }
    }

    /// The wrapped lookup.
    pub const fn inner(&self) -> &D {
        &self.inner
    }

    /// The breaker shared by all lookups through this wrapper.
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn attempt(&self, product_name: &str, deadline: Instant) -> Result<Decimal, DiscountError> {
        let attempt_deadline = deadline.min(Instant::now() + self.request_timeout);
        tokio::time::timeout_at(attempt_deadline, self.inner.lookup(product_name, attempt_deadline))
            .await
            .unwrap_or(Err(DiscountError::Timeout))
    }
}

impl<D: DiscountLookup> DiscountLookup for ResilientDiscountLookup<D> {
    #[instrument(skip(self, deadline), fields(product = %product_name))]
    async fn lookup(&self, product_name: &str, deadline: Instant) -> Result<Decimal, DiscountError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            if Instant::now() >= deadline {
                return Err(DiscountError::Timeout);
            }
            let Some(permit) = self.breaker.try_acquire() else {
                return Err(DiscountError::Unavailable("circuit open".to_string()));
            };

            let err = match self.attempt(product_name, deadline).await {
                Ok(amount) => {
                    self.breaker.record_success();
                    return Ok(amount);
                }
                Err(err) if err.is_transient() => err,
                // The service answered, it just did not like the request.
                Err(err) => return Err(err),
            };

            self.breaker.record_failure();
            drop(permit);

            if attempt >= self.retry.max_retries {
                return Err(exhausted(err));
            }

            let delay = jittered(backoff);
            if Instant::now() + delay >= deadline {
                return Err(exhausted(err));
            }

            attempt += 1;
            debug!(
                attempt,
                delay_ms = delay.as_millis(),
                error = %err,
                "Retrying discount lookup"
            );
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_mul(2).min(self.retry.max_backoff);
        }
    }
}

/// Collapse a final transient failure into `Timeout` or `Unavailable`.
fn exhausted(err: DiscountError) -> DiscountError {
    match err {
        DiscountError::Timeout => DiscountError::Timeout,
        DiscountError::Http(ref e) if e.is_timeout() => DiscountError::Timeout,
        other => DiscountError::Unavailable(other.to_string()),
    }
}

/// Random delay in `[backoff / 2, backoff]`.
fn jittered(backoff: Duration) -> Duration {
    let half = backoff / 2;
    let spread = u64::try_from(half.as_micros()).unwrap_or(u64::MAX);
    if spread == 0 {
        return backoff;
    }
    half + Duration::from_micros(rand::rng().random_range(0..=spread))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use url::Url;

    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::discount::CircuitState;

    struct Scripted<F> {
        calls: AtomicU32,
        delay: Duration,
        respond: F,
    }

    impl<F> Scripted<F>
    where
        F: Fn(u32) -> Result<Decimal, DiscountError> + Send + Sync,
    {
        fn new(respond: F) -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                respond,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl<F> DiscountLookup for Scripted<F>
    where
        F: Fn(u32) -> Result<Decimal, DiscountError> + Send + Sync,
    {
        async fn lookup(&self, _name: &str, _deadline: Instant) -> Result<Decimal, DiscountError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.respond)(n)
        }
    }

    fn unavailable() -> DiscountError {
        DiscountError::Api {
            status: 503,
            message: "down".to_string(),
        }
    }

    fn config() -> DiscountConfig {
        let mut config = DiscountConfig::new(Url::parse("http://discounts.local").unwrap());
        config.request_timeout = Duration::from_millis(250);
        config.retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        };
        config.circuit = CircuitBreakerConfig {
            failure_threshold: 100,
            success_threshold: 1,
            cooldown: Duration::from_secs(30),
        };
        config
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let lookup = ResilientDiscountLookup::new(
            Scripted::new(|n| if n < 2 { Err(unavailable()) } else { Ok(Decimal::ONE) }),
            &config(),
        );

        assert_eq!(lookup.lookup("Widget", far_deadline()).await.unwrap(), Decimal::ONE);
        assert_eq!(lookup.inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let lookup = ResilientDiscountLookup::new(Scripted::new(|_| Err(unavailable())), &config());

        let err = lookup.lookup("Widget", far_deadline()).await.unwrap_err();
        assert!(matches!(err, DiscountError::Unavailable(_)));
        assert_eq!(lookup.inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let lookup = ResilientDiscountLookup::new(
            Scripted::new(|_| {
                Err(DiscountError::InvalidResponse("not json".to_string()))
            }),
            &config(),
        );

        assert!(matches!(
            lookup.lookup("Widget", far_deadline()).await,
            Err(DiscountError::InvalidResponse(_))
        ));
        assert_eq!(lookup.inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_bounded_by_request_timeout() {
        let mut inner = Scripted::new(|_| Ok(Decimal::ONE));
        inner.delay = Duration::from_secs(5);
        let mut config = config();
        config.retry.max_retries = 0;
        let lookup = ResilientDiscountLookup::new(inner, &config);

        let start = Instant::now();
        let err = lookup.lookup("Widget", far_deadline()).await.unwrap_err();

        assert!(matches!(err, DiscountError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_never_sleeps_past_deadline() {
        let mut config = config();
        config.retry.initial_backoff = Duration::from_secs(2);
        config.retry.max_backoff = Duration::from_secs(2);
        let lookup = ResilientDiscountLookup::new(Scripted::new(|_| Err(unavailable())), &config);

        let start = Instant::now();
        let deadline = start + Duration::from_millis(500);
        let err = lookup.lookup("Widget", deadline).await.unwrap_err();

        assert!(matches!(err, DiscountError::Unavailable(_)));
        assert_eq!(lookup.inner.calls(), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let mut config = config();
        config.retry.max_retries = 0;
        config.circuit.failure_threshold = 2;
        let lookup = ResilientDiscountLookup::new(Scripted::new(|_| Err(unavailable())), &config);

        for _ in 0..2 {
            lookup.lookup("Widget", far_deadline()).await.unwrap_err();
        }
        assert_eq!(lookup.breaker().state(), CircuitState::Open);

        let err = lookup.lookup("Widget", far_deadline()).await.unwrap_err();
        assert!(matches!(err, DiscountError::Unavailable(_)));
        assert_eq!(lookup.inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_circuit_failures() {
        let mut inner = Scripted::new(|_| Ok(Decimal::ONE));
        inner.delay = Duration::from_secs(5);
        let mut config = config();
        config.retry.max_retries = 0;
        config.circuit.failure_threshold = 1;
        let lookup = ResilientDiscountLookup::new(inner, &config);

        lookup.lookup("Widget", far_deadline()).await.unwrap_err();
        assert_eq!(lookup.breaker().state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_sends_a_single_trial() {
        let mut inner = Scripted::new(|n| if n == 0 { Err(unavailable()) } else { Ok(Decimal::ONE) });
        inner.delay = Duration::from_millis(100);
        let mut config = config();
        config.retry.max_retries = 0;
        config.circuit.failure_threshold = 1;
        let lookup = ResilientDiscountLookup::new(inner, &config);

        lookup.lookup("Widget", far_deadline()).await.unwrap_err();
        assert_eq!(lookup.breaker().state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(30)).await;

        let results = futures::future::join_all(
            (0..3).map(|_| lookup.lookup("Widget", far_deadline())),
        )
        .await;

        assert_eq!(lookup.inner.calls(), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(DiscountError::Unavailable(_))))
                .count(),
            2
        );
        assert_eq!(lookup.breaker().state(), CircuitState::Closed);
    }

    #[test]
    fn test_jitter_stays_within_backoff() {
        let backoff = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = jittered(backoff);
            assert!(delay >= backoff / 2 && delay <= backoff);
        }
    }
}
