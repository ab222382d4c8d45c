//! Retry policy for oracle calls

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{ClassificationError, OracleError};
use crate::config::OracleConfig;

/// Bounded exponential backoff.
///
/// Total attempts = 1 + `max_retries`. Only transient errors are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomised either way, in [0, 1]
    pub jitter: f64,
}

impl RetryPolicy {
    pub const fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_retries: config.retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter: config.backoff_jitter,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`, then jittered. Never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);

        if self.jitter <= 0.0 || raw.is_zero() {
            return raw;
        }
        let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        raw.mul_f64((1.0 + factor).max(0.0)).min(self.max_delay)
    }

    /// `attempts_made` counts the attempt that just failed.
    pub const fn should_retry(&self, err: &OracleError, attempts_made: u32) -> bool {
        err.is_transient() && attempts_made <= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

/// Run `op` under `policy`: each attempt is bounded by `timeout`, transient
/// failures back off and retry, anything else is surfaced at once.
///
/// Cancellation is observed before each attempt and during backoff sleeps.
/// An attempt already in flight is left to finish or hit its own timeout.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    net_id: &str,
    mut op: F,
) -> Result<T, ClassificationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(ClassificationError::Cancelled);
        }
        attempts += 1;

        let err = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => OracleError::Timeout(timeout),
        };

        if !err.is_transient() {
            error!(net_id = %net_id, error = %err, "Oracle refused call, not retrying");
            return Err(ClassificationError::Rejected(err));
        }
        if !policy.should_retry(&err, attempts) {
            warn!(net_id = %net_id, attempts, error = %err, "Oracle retries exhausted");
            return Err(ClassificationError::Exhausted { attempts, last: err });
        }

        let delay = policy.delay_for(attempts);
        warn!(
            net_id = %net_id,
            attempt = attempts,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Oracle call failed, backing off"
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(ClassificationError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            jitter,
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = policy(0.0);
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(4), Duration::from_millis(3000));
        assert_eq!(p.delay_for(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let p = policy(0.2);
        for _ in 0..200 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1200), "{d:?}");
        }
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let p = policy(0.0);
        let timeout = OracleError::Timeout(Duration::from_secs(1));
        assert!(p.should_retry(&timeout, 1));
        assert!(p.should_retry(&timeout, 3));
        assert!(!p.should_retry(&timeout, 4));
        assert!(!p.should_retry(&OracleError::Rejected("bad".into()), 1));
        assert!(!p.should_retry(&OracleError::InvalidResponse("nan".into()), 1));
        assert_eq!(p.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = call_with_retry(&policy(0.0), Duration::from_secs(10), &cancel, "N1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(ClassificationError::Exhausted { attempts: 4, last: OracleError::Timeout(_) })
        ));
        // 4 timeouts + 0.5s + 1s + 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(43_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let p = RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..policy(0.0)
        };

        let handle = tokio::spawn(async move {
            call_with_retry(&p, Duration::from_secs(1), &cancel, "N1", || async {
                Err::<(), _>(OracleError::Unavailable("down".into()))
            })
            .await
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();

        assert_eq!(handle.await.unwrap(), Err(ClassificationError::Cancelled));
    }
}
