//! Exponential backoff with jitter, driven by the error classification
//! from [`crate::error`]. Grounded in the retry loop pattern used by
//! other hand-rolled Anthropic clients in the wild: a fixed attempt
//! budget, doubling delay, and an explicit `Retry-After` override for 429s.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::error::GatewayError;

/// Exponential backoff parameters. Defaults match the gateway's documented
/// policy: 1s initial delay, doubling, capped at 10s, jitter on, 3 retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    pub jitter: bool,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(10),
            jitter: true,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// The backoff delay before attempt `attempt` (1-indexed: the delay
    /// before the *second* attempt is `delay_for(1)`).
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = scaled.min(self.cap.as_secs_f64());
        let base = Duration::from_secs_f64(capped.max(0.0));

        if !self.jitter {
            return base;
        }

        let mut rng = rand::rng();
        let jitter_factor: f64 = rng.random_range(0.5..=1.0);
        Duration::from_secs_f64(base.as_secs_f64() * jitter_factor)
    }
}

/// Default wait when a 429 carries no `Retry-After` header.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Whether `err` (seen on `attempt_no`, 0-indexed) should be retried under
/// `policy` and, if so, how long to wait first. Shared by [`run_with_retry`]
/// and by `transport::chat_stream`'s own retry loop — the streaming path
/// can't reuse `run_with_retry` itself because its `on_delta: &mut dyn
/// FnMut` can't be threaded through a closure with a single associated
/// `Fut` type (each call would need to reborrow it for a fresh lifetime).
pub(crate) fn retry_decision(policy: &RetryPolicy, attempt_no: u32, err: &GatewayError, retry_after: Option<Duration>) -> Option<Duration> {
    if !err.is_retryable() || attempt_no == policy.max_retries {
        return None;
    }

    Some(match retry_after {
        Some(d) if matches!(err, GatewayError::RateLimited(_)) => d,
        _ if matches!(err, GatewayError::RateLimited(_)) => DEFAULT_RATE_LIMIT_WAIT,
        _ => policy.delay_for(attempt_no + 1),
    })
}

/// Runs `attempt` up to `policy.max_retries + 1` times, sleeping with
/// exponential backoff between retryable failures. `retry_after` is
/// consulted after each failure and, when present, overrides the computed
/// backoff delay, so the provider's own hint always wins over our guess.
///
/// Cancellation-aware: `cancelled` is raced against both the attempt and
/// the backoff sleep, and a cancellation firing either one returns
/// `GatewayError::Cancelled` without further attempts.
pub async fn run_with_retry<F, Fut, C>(policy: RetryPolicy, mut attempt: F, mut cancelled: C) -> Result<crate::types::ChatResponse, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<crate::types::ChatResponse, (GatewayError, Option<Duration>)>>,
    C: FnMut() -> bool,
{
    let mut last_err = None;

    for attempt_no in 0..=policy.max_retries {
        if cancelled() {
            return Err(GatewayError::Cancelled);
        }

        match attempt(attempt_no).await {
            Ok(response) => return Ok(response),
            Err((err, retry_after)) => match retry_decision(&policy, attempt_no, &err, retry_after) {
                Some(delay) => {
                    last_err = Some(err);
                    sleep(delay).await;

                    if cancelled() {
                        return Err(GatewayError::Cancelled);
                    }
                }
                None => return Err(err),
            },
        }
    }

    Err(last_err.unwrap_or(GatewayError::Transient("retry budget exhausted".to_string())))
}

/// Parses a `Retry-After` header value, which is either a number of
/// seconds or an HTTP-date (RFC 7231 IMF-fixdate, e.g.
/// `Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let format = time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let target = time::PrimitiveDateTime::parse(value, &format).ok()?.assume_utc();
    let now = time::OffsetDateTime::now_utc();

    (target - now).try_into().ok()
}
