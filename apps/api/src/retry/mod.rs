//! Resilient call executor — retries transient AI API failures with exponential
//! backoff, honoring `RetryInfo` hints the server attaches to its errors.
//!
//! Every generative-AI call in the service goes through [`execute`]. The executor
//! only looks at whether an attempt failed and how that failure classifies; it
//! never inspects the success value and never rewrites the error it returns.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Attempt budget used when the caller has no reason to pick another.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Statuses that signal a transient upstream condition.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 503];
/// Some upstream failures carry no status, only this marker in the message.
const OVERLOADED_MARKER: &str = "Overloaded";
const RETRY_INFO_TAG: &str = "RetryInfo";

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_JITTER_MS: u64 = 1000;
const HINT_JITTER_MS: u64 = 500;

// ────────────────────────────────────────────────────────────────────────────
// Error surface
// ────────────────────────────────────────────────────────────────────────────

/// A structured detail record attached to an upstream error.
///
/// `retry_delay_seconds` is parsed once from the raw `retryDelay` string
/// (e.g. `"2.5s"`); a malformed value is kept as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryHint {
    pub type_tag: String,
    pub retry_delay_seconds: Option<f64>,
}

impl RetryHint {
    pub fn new(type_tag: impl Into<String>, raw_retry_delay: Option<&str>) -> Self {
        Self {
            type_tag: type_tag.into(),
            retry_delay_seconds: raw_retry_delay.and_then(parse_retry_delay),
        }
    }

    pub fn is_retry_info(&self) -> bool {
        self.type_tag.contains(RETRY_INFO_TAG)
    }
}

/// Errors the executor knows how to classify.
pub trait ClassifiedError {
    fn status(&self) -> Option<u16>;

    fn message(&self) -> Option<&str>;

    fn retry_hints(&self) -> &[RetryHint] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySource {
    ServerHint,
    ComputedBackoff,
}

impl fmt::Display for DelaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelaySource::ServerHint => f.write_str("server-hint"),
            DelaySource::ComputedBackoff => f.write_str("computed-backoff"),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
    pub source: DelaySource,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
            source: DelaySource::ComputedBackoff,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification and delay computation (pure)
// ────────────────────────────────────────────────────────────────────────────

/// Retryable iff the status is 429/500/503 or the message mentions "Overloaded".
pub fn classify<E: ClassifiedError + ?Sized>(error: &E) -> Classification {
    let retryable_status = error
        .status()
        .is_some_and(|status| RETRYABLE_STATUSES.contains(&status));
    let overloaded = error
        .message()
        .is_some_and(|message| message.contains(OVERLOADED_MARKER));

    if retryable_status || overloaded {
        Classification::Retryable
    } else {
        Classification::Terminal
    }
}

/// Parses a `retryDelay` value of the form `<decimal>s` into seconds.
pub fn parse_retry_delay(raw: &str) -> Option<f64> {
    let number = raw.trim().strip_suffix('s')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    number.parse::<f64>().ok().filter(|seconds| seconds.is_finite())
}

/// Seconds from the first `RetryInfo` hint, if it carried a parsable delay.
pub fn server_hint_seconds(hints: &[RetryHint]) -> Option<f64> {
    hints
        .iter()
        .find(|hint| hint.is_retry_info())
        .and_then(|hint| hint.retry_delay_seconds)
}

/// `2^attempt_index * 1000 + jitter_ms` milliseconds.
pub fn backoff_delay(attempt_index: u32, jitter_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).saturating_add(jitter_ms))
}

/// `seconds * 1000 + jitter_ms` milliseconds.
pub fn hint_delay(seconds: f64, jitter_ms: u64) -> Duration {
    let base_ms = (seconds * 1000.0).round() as u64;
    Duration::from_millis(base_ms.saturating_add(jitter_ms))
}

/// Exponential backoff with up to one second of jitter.
pub fn compute_delay(attempt_index: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
    backoff_delay(attempt_index, jitter)
}

/// Server-hinted delay with up to half a second of jitter.
pub fn hinted_delay(seconds: f64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..HINT_JITTER_MS);
    hint_delay(seconds, jitter)
}

/// Decides whether the failure at `attempt_index` (zero-based) is retried, and after how long.
pub fn decide<E: ClassifiedError + ?Sized>(
    error: &E,
    attempt_index: u32,
    max_attempts: u32,
) -> RetryDecision {
    let last_attempt = attempt_index.saturating_add(1) >= max_attempts;
    if last_attempt || classify(error) == Classification::Terminal {
        return RetryDecision::stop();
    }

    match server_hint_seconds(error.retry_hints()) {
        Some(seconds) => RetryDecision {
            should_retry: true,
            delay: hinted_delay(seconds),
            source: DelaySource::ServerHint,
        },
        None => RetryDecision {
            should_retry: true,
            delay: compute_delay(attempt_index),
            source: DelaySource::ComputedBackoff,
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Executor
// ────────────────────────────────────────────────────────────────────────────

/// Runs `invocation` until it succeeds, fails terminally, or `max_attempts`
/// attempts have been spent. Returns the last error unmodified.
///
/// A `max_attempts` of zero is treated as one.
pub async fn execute<T, E, F, Fut>(mut invocation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifiedError,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        let error = match invocation().await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        let decision = decide(&error, attempt, max_attempts);
        let message = error.message().unwrap_or("no message");

        if !decision.should_retry {
            match classify(&error) {
                Classification::Terminal => warn!(
                    "AI call attempt {}/{} failed with terminal error (status {:?}): {}",
                    attempt + 1,
                    max_attempts,
                    error.status(),
                    message
                ),
                Classification::Retryable => warn!(
                    "AI call failed after {} attempts (status {:?}): {}",
                    max_attempts,
                    error.status(),
                    message
                ),
            }
            return Err(error);
        }

        warn!(
            "AI call attempt {}/{} failed (status {:?}): {}. Retrying after {}ms ({})",
            attempt + 1,
            max_attempts,
            error.status(),
            message,
            decision.delay.as_millis(),
            decision.source
        );
        drop(error);

        tokio::time::sleep(decision.delay).await;
        attempt += 1;
    }
}
