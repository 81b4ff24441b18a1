use crate::core::errors::{TranslationError, TranslationResult};
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast until the cool-down elapses
    Open,
    /// A single probe call at a time tests whether the backend recovered;
    /// other callers fail fast until it settles
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// Time spent open before a probe is allowed
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Fail-fast guard in front of one translation backend.
///
/// Closed -> Open after `failure_threshold` consecutive failures, Open -> HalfOpen
/// once `cool_down` has passed, HalfOpen -> Closed on the first success
/// (or back to Open on failure). Nothing is retried.
pub struct CircuitBreaker {
    backend: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

enum Admission {
    Pass,
    Probe,
    Rejected,
}

/// Frees the half-open probe slot however the probe call ends, including cancellation
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        self.breaker.inner.lock().probe_in_flight = false;
    }
}

impl CircuitBreaker {
    pub fn new(backend: &'static str) -> Self {
        Self::with_config(backend, CircuitBreakerConfig::default())
    }

    pub fn with_config(backend: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            backend,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            let cooled = inner
                .opened_at
                .map_or(true, |at| at.elapsed() >= self.config.cool_down);
            if !cooled {
                return Admission::Rejected;
            }
            inner.state = CircuitState::HalfOpen;
        }

        match inner.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Admission::Probe
            }
            _ => Admission::Rejected,
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!("{} backend recovered, closing circuit", self.backend);
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            warn!(
                "{} backend failed {} times in a row, opening circuit for {:?}",
                self.backend, inner.consecutive_failures, self.config.cool_down
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Run `call` unless the circuit is open, recording its outcome.
    ///
    /// Configuration errors do not count against the backend.
    pub async fn call<T, F>(&self, call: F) -> TranslationResult<T>
    where
        F: Future<Output = TranslationResult<T>>,
    {
        let _probe = match self.admit() {
            Admission::Pass => None,
            Admission::Probe => Some(ProbeSlot { breaker: self }),
            Admission::Rejected => {
                return Err(TranslationError::CircuitOpen {
                    backend: self.backend,
                })
            }
        };

        let result = call.await;
        match &result {
            Ok(_) => self.record_success(),
            Err(TranslationError::MissingCredentials { .. }) => {}
            Err(_) => self.record_failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> TranslationResult<String> {
        Err(TranslationError::InvalidResponse {
            backend: "test",
            reason: "boom".to_string(),
        })
    }

    fn breaker(cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::with_config(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                cool_down,
            },
        )
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = breaker(Duration::from_secs(60));

        for _ in 0..3 {
            assert!(breaker.call(async { failing() }).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(async { Ok("never runs".to_string()) }).await;
        assert!(matches!(result, Err(TranslationError::CircuitOpen { backend: "test" })));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(Duration::from_secs(60));

        breaker.call(async { failing() }).await.ok();
        breaker.call(async { failing() }).await.ok();
        breaker.call(async { Ok("hi".to_string()) }).await.unwrap();
        breaker.call(async { failing() }).await.ok();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe() {
        let breaker = breaker(Duration::from_millis(50));
        for _ in 0..3 {
            breaker.call(async { failing() }).await.ok();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Failed probe reopens immediately
        breaker.call(async { failing() }).await.ok();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let text = breaker.call(async { Ok("back".to_string()) }).await.unwrap();
        assert_eq!(text, "back");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    async fn open_and_cool(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            breaker.call(async { failing() }).await.ok();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn test_half_open_admits_one_call_at_a_time() {
        let breaker = breaker(Duration::from_millis(50));
        open_and_cool(&breaker).await;

        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let probe = breaker.call(async move {
            released.await.ok();
            Ok::<_, TranslationError>("probe".to_string())
        });
        tokio::pin!(probe);

        // Let the probe get admitted and park on the channel
        tokio::select! {
            biased;
            _ = &mut probe => panic!("probe finished before release"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let second = breaker.call(async { Ok("second".to_string()) }).await;
        assert!(matches!(second, Err(TranslationError::CircuitOpen { .. })));

        release.send(()).unwrap();
        assert_eq!(probe.await.unwrap(), "probe");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.call(async { Ok("after".to_string()) }).await.unwrap(), "after");
    }

    #[tokio::test]
    async fn test_cancelled_probe_frees_the_slot() {
        let breaker = breaker(Duration::from_millis(50));
        open_and_cool(&breaker).await;

        {
            let probe = breaker.call(std::future::pending::<TranslationResult<String>>());
            tokio::pin!(probe);
            tokio::select! {
                biased;
                _ = &mut probe => unreachable!(),
                _ = tokio::task::yield_now() => {}
            }
        }

        let text = breaker.call(async { Ok("next".to_string()) }).await.unwrap();
        assert_eq!(text, "next");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_missing_credentials_do_not_trip() {
        let breaker = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let result: TranslationResult<String> = breaker
                .call(async {
                    Err(TranslationError::MissingCredentials {
                        backend: "test",
                        variable: "TEST_KEY",
                    })
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
