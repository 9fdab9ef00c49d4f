//! Blocking retry with backoff and rate-limit awareness
//!
//! The wait between attempts is a genuine blocking sleep: the target host
//! has no asynchronous primitive, so `attempts × max_delay_ms` must be
//! chosen conservatively against its execution budget.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::host::Clock;

/// Options for [`with_retries`]
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of invocations of the wrapped function
    pub attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay on each subsequent retry
    pub backoff_factor: f64,

    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,

    /// Jitter fraction; the delay is widened by up to this fraction
    pub jitter: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: 0.0,
        }
    }
}

/// A failed attempt: status and headers are absent on network errors
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// HTTP status, if a response was received
    pub status: Option<u16>,

    /// Response headers, if a response was received
    pub headers: BTreeMap<String, String>,

    /// Response body, if a response was received
    pub body: String,

    /// Request URL
    pub url: String,

    /// Description of the failure
    pub message: String,
}

impl AttemptFailure {
    /// Network failure with no response
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            headers: BTreeMap::new(),
            body: String::new(),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Context passed to a caller-supplied retry-decision callback
///
/// Ephemeral: built fresh for each failed attempt, never persisted.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// 1-based number of the attempt that just failed
    pub attempt: u32,

    /// The failure being considered
    pub error: &'a AttemptFailure,

    /// Delay the default resolution would use, in milliseconds
    pub delay_ms: u64,

    /// Parsed `Retry-After` header, if present
    pub retry_after_ms: Option<u64>,

    /// Current time in epoch milliseconds, for header math
    pub now_ms: i64,
}

/// A callback's verdict; `None` fields defer to the default resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryDecision {
    /// Whether to retry; `None` defers to the default predicate
    pub retry: Option<bool>,

    /// Delay override in milliseconds; `None` defers to the default delay
    pub delay_ms: Option<u64>,
}

/// Caller-supplied retry-decision callback
pub type RetryOn<'a> = dyn Fn(&RetryContext<'_>) -> RetryDecision + 'a;

/// Invoke `f(attempt)` with bounded, blocking retries
///
/// The default predicate retries on status 429, any 5xx, or a network
/// error with no status, while attempts remain. Delay resolution order:
/// callback delay, then a parsed `Retry-After` header, then exponential
/// backoff `min(initial × factor^(attempt-1), max)`. The final delay is
/// widened by the jitter fraction and clamped to `max_delay_ms`.
///
/// `f` is invoked at most `attempts` times; with `attempts = 1` this
/// never sleeps.
pub fn with_retries<T>(
    clock: &mut dyn Clock,
    opts: &RetryOptions,
    retry_on: Option<&RetryOn<'_>>,
    mut f: impl FnMut(u32) -> std::result::Result<T, AttemptFailure>,
) -> Result<T> {
    let attempts = opts.attempts.max(1);

    for attempt in 1..=attempts {
        let failure = match f(attempt) {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        let now_ms = clock.now_ms();
        let retry_after_ms = failure
            .header("retry-after")
            .and_then(|v| parse_retry_after(v, now_ms));
        let backoff_ms = backoff_delay(opts, attempt);
        let default_delay = retry_after_ms.unwrap_or(backoff_ms);

        let default_retry = is_transient(&failure);
        let decision = match retry_on {
            Some(callback) => callback(&RetryContext {
                attempt,
                error: &failure,
                delay_ms: default_delay,
                retry_after_ms,
                now_ms,
            }),
            None => RetryDecision::default(),
        };

        let should_retry = decision.retry.unwrap_or(default_retry) && attempt < attempts;
        if !should_retry {
            return Err(give_up(attempt, attempts, failure, decision, default_retry));
        }

        let mut delay = decision.delay_ms.unwrap_or(default_delay);
        if opts.jitter > 0.0 {
            let widened = delay as f64 * (1.0 + opts.jitter * fastrand::f64());
            delay = widened as u64;
        }
        delay = delay.min(opts.max_delay_ms);

        tracing::debug!(attempt, delay_ms = delay, "retrying after failure");
        clock.sleep(delay);
    }

    unreachable!("loop always returns on the final attempt")
}

/// Rate-limit-aware variant of [`with_retries`]
///
/// Composes an additional decision layer over the caller's `retry_on`:
/// when an `x-ratelimit-remaining` style header reports zero quota, a
/// retry is forced with a delay computed from the paired reset header,
/// taking the larger of that delay and any delay the caller requested.
pub fn rate_limit_aware<T>(
    clock: &mut dyn Clock,
    opts: &RetryOptions,
    retry_on: Option<&RetryOn<'_>>,
    f: impl FnMut(u32) -> std::result::Result<T, AttemptFailure>,
) -> Result<T> {
    let composed = move |ctx: &RetryContext<'_>| -> RetryDecision {
        let caller = retry_on.map(|cb| cb(ctx)).unwrap_or_default();

        let exhausted = remaining_quota(ctx.error).is_some_and(|remaining| remaining == 0);
        if !exhausted {
            return caller;
        }

        let reset_delay = reset_delay_ms(ctx.error, ctx.now_ms).unwrap_or(ctx.delay_ms);
        RetryDecision {
            retry: Some(true),
            delay_ms: Some(reset_delay.max(caller.delay_ms.unwrap_or(0))),
        }
    };

    with_retries(clock, opts, Some(&composed), f)
}

/// Parse a `Retry-After` style value into a millisecond offset from now
///
/// Accepts integer seconds, Unix epoch-seconds, epoch-milliseconds, and
/// HTTP dates. Past instants resolve to zero.
pub fn parse_retry_after(value: &str, now_ms: i64) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(n) = value.parse::<i64>() {
        if n < 0 {
            return None;
        }
        // Small values are delta-seconds; epoch-milliseconds are 13 digits
        // where epoch-seconds are 10, so magnitude separates the three.
        let offset = if n < 10_000_000 {
            n.saturating_mul(1000)
        } else if n >= 100_000_000_000 {
            n - now_ms
        } else {
            n.saturating_mul(1000) - now_ms
        };
        return Some(offset.max(0) as u64);
    }

    let date = httpdate::parse_http_date(value).ok()?;
    let target_ms = date
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as i64)?;
    Some((target_ms - now_ms).max(0) as u64)
}

fn is_transient(failure: &AttemptFailure) -> bool {
    match failure.status {
        None => true,
        Some(429) => true,
        Some(status) => (500..600).contains(&status),
    }
}

fn backoff_delay(opts: &RetryOptions, attempt: u32) -> u64 {
    let raw = opts.initial_delay_ms as f64 * opts.backoff_factor.powi(attempt as i32 - 1);
    (raw.min(opts.max_delay_ms as f64).max(0.0)) as u64
}

fn remaining_quota(failure: &AttemptFailure) -> Option<u64> {
    for name in ["x-ratelimit-remaining", "x-rate-limit-remaining"] {
        if let Some(v) = failure.header(name) {
            return v.trim().parse::<u64>().ok();
        }
    }
    None
}

fn reset_delay_ms(failure: &AttemptFailure, now_ms: i64) -> Option<u64> {
    for name in ["x-ratelimit-reset", "x-rate-limit-reset"] {
        if let Some(v) = failure.header(name) {
            return parse_retry_after(v, now_ms);
        }
    }
    None
}

fn give_up(
    attempt: u32,
    attempts: u32,
    failure: AttemptFailure,
    decision: RetryDecision,
    default_retry: bool,
) -> Error {
    let wanted_retry = decision.retry.unwrap_or(default_retry);
    if wanted_retry && attempt >= attempts {
        tracing::warn!(
            attempts,
            status = ?failure.status,
            url = %failure.url,
            "retries exhausted"
        );
        return Error::RetriesExhausted {
            attempts,
            status: failure.status,
            body: failure.body,
            message: failure.message,
        };
    }

    match failure.status {
        Some(status) => Error::Http {
            status,
            url: failure.url,
            message: failure.message,
            body: failure.body,
        },
        None => Error::Transport {
            message: failure.message,
        },
    }
}
