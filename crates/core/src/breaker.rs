//! Circuit breaker — the CLOSED/OPEN/HALF_OPEN failure gate.
//!
//! One instance guards each upstream integration. Shared across requests;
//! state mutations are last-write-wins behind a mutex, which is enough
//! because a brief race only delays a state change.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::BreakerError;

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub open_timeout: Duration,
    /// Successful probes required to close again.
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            open_timeout: Duration::from_secs(45),
            half_open_successes: 2,
        }
    }
}

/// Breaker state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// A point-in-time view for status reporting.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub retry_in_secs: Option<u64>,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
    half_open_successes: u32,
}

/// The failure gate guarding one upstream provider.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// Error from a guarded call: rejected by the gate, or the call itself
/// failed.
#[derive(Debug)]
pub enum GuardError<E> {
    Rejected(BreakerError),
    Inner(E),
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                next_attempt: None,
                half_open_successes: 0,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the protected call through the gate.
    ///
    /// While OPEN and before the retry time, the call is rejected without
    /// being invoked. At or after the retry time the breaker moves to
    /// HALF_OPEN and lets the probe through.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> std::result::Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.check().map_err(GuardError::Rejected)?;

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(GuardError::Inner(e))
            }
        }
    }

    /// Gate check. May transition OPEN → HALF_OPEN.
    pub fn check(&self) -> std::result::Result<(), BreakerError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let now = Instant::now();
                let next = inner.next_attempt.unwrap_or(now);
                if now < next {
                    let retry_in_secs = (next - now).as_secs();
                    Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in_secs,
                    })
                } else {
                    debug!(breaker = %self.name, "Breaker entering half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful protected call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_successes {
                    debug!(breaker = %self.name, "Breaker closed");
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.next_attempt = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed protected call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.next_attempt = Some(Instant::now() + self.config.open_timeout);
                }
            }
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "Probe failed, breaker re-opened");
                inner.state = BreakerState::Open;
                inner.consecutive_failures += 1;
                inner.next_attempt = Some(Instant::now() + self.config.open_timeout);
            }
            BreakerState::Open => {}
        }
    }

    /// Observable state for status reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        let retry_in_secs = match inner.state {
            BreakerState::Open => inner
                .next_attempt
                .map(|next| next.saturating_duration_since(Instant::now()).as_secs()),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            retry_in_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(30),
                half_open_successes: 2,
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> std::result::Result<(), GuardError<&'static str>> {
        b.execute(|| async { Err::<(), _>("boom") }).await.map(|_| ())
    }

    async fn succeed(b: &CircuitBreaker) -> std::result::Result<(), GuardError<&'static str>> {
        b.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let b = fast_breaker();
        for _ in 0..3 {
            assert!(matches!(fail(&b).await, Err(GuardError::Inner(_))));
        }
        assert_eq!(b.snapshot().state, BreakerState::Open);

        // Next call is rejected without running the protected function.
        let mut invoked = false;
        let result = b
            .execute(|| {
                invoked = true;
                async { Ok::<_, &'static str>(()) }
            })
            .await;
        assert!(matches!(result, Err(GuardError::Rejected(_))));
        assert!(!invoked);
    }

    #[tokio::test(start_paused = true)]
    async fn open_rejection_carries_remaining_wait() {
        let b = fast_breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        match b.check().unwrap_err() {
            BreakerError::Open { retry_in_secs, .. } => assert!(retry_in_secs <= 30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn still_rejects_just_before_timeout() {
        let b = fast_breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_millis(29_999)).await;
        assert!(b.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_at_timeout_then_closes_on_successes() {
        let b = fast_breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        // First probe allowed, breaker is half-open.
        assert!(succeed(&b).await.is_ok());
        assert_eq!(b.snapshot().state, BreakerState::HalfOpen);

        // Second success closes it.
        assert!(succeed(&b).await.is_ok());
        assert_eq!(b.snapshot().state, BreakerState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let b = fast_breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(matches!(fail(&b).await, Err(GuardError::Inner(_))));
        assert_eq!(b.snapshot().state, BreakerState::Open);
        assert!(b.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count_while_closed() {
        let b = fast_breaker();
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        let _ = succeed(&b).await;
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        // Only 2 consecutive failures — still closed.
        assert_eq!(b.snapshot().state, BreakerState::Closed);
    }
}
