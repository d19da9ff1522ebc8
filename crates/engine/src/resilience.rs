//! Retry and circuit-breaker policy resolution, and the breaker state machine.
//!
//! Stages reference shared pools via `ref`; stage-level fields win over the
//! pool entry. A retry policy is active only when `maxRetries`, `delayMs`,
//! and a non-empty `httpStatus` set survive the merge. The breaker inherits
//! its failure-status set from the stage's retry policy, so a stage without
//! retry cannot drive a breaker.
//!
//! The breaker itself is a three-state machine (closed, open, half-open) with
//! one timer and two counters, keyed by explicit `ref` or the stage name.
//! Timing runs off the engine clock so tests control it.

use chrono::{DateTime, Duration, Utc};

use flowctl_types::lookup::get_ignore_case;
use flowctl_types::{CircuitBreakerPolicy, ResiliencePools, RetryPolicy};

const DEFAULT_CLOSE_ON_SUCCESS_ATTEMPTS: u32 = 1;

/// A retry policy after merging stage and pool fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRetry {
    pub max_retries: u32,
    pub delay_ms: u64,
    pub http_status: Vec<u16>,
    pub on_exception: Option<String>,
}

impl EffectiveRetry {
    /// Whether a status should be retried.
    pub fn retries_status(&self, status: u16) -> bool {
        self.http_status.contains(&status)
    }
}

/// Merges a stage retry policy with its shared pool entry.
///
/// Returns `None` when the merged policy is incomplete: retry stays inactive
/// rather than half-configured.
pub fn effective_retry(stage_policy: Option<&RetryPolicy>, pools: &ResiliencePools) -> Option<EffectiveRetry> {
    let stage_policy = stage_policy?;
    let pool_policy = stage_policy
        .pool_ref
        .as_deref()
        .and_then(|name| get_ignore_case(&pools.retries, name));

    let max_retries = stage_policy.max_retries.or_else(|| pool_policy.and_then(|pool| pool.max_retries))?;
    let delay_ms = stage_policy.delay_ms.or_else(|| pool_policy.and_then(|pool| pool.delay_ms))?;
    let http_status = if !stage_policy.http_status.is_empty() {
        stage_policy.http_status.clone()
    } else {
        pool_policy.map(|pool| pool.http_status.clone()).unwrap_or_default()
    };
    if http_status.is_empty() {
        return None;
    }

    let on_exception = stage_policy
        .messages
        .as_ref()
        .and_then(|messages| messages.on_exception.clone())
        .or_else(|| {
            pool_policy
                .and_then(|pool| pool.messages.as_ref())
                .and_then(|messages| messages.on_exception.clone())
        });

    Some(EffectiveRetry {
        max_retries,
        delay_ms,
        http_status,
        on_exception,
    })
}

/// A circuit-breaker policy after merging stage and pool fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveBreaker {
    /// State key: explicit `ref` when present, otherwise the stage name.
    pub key: String,
    pub failure_threshold: u32,
    pub break_ms: i64,
    pub close_on_success_attempts: u32,
    /// Failure statuses, inherited from the matching retry policy.
    pub http_status: Vec<u16>,
    pub on_open: Option<String>,
    pub on_blocked: Option<String>,
}

impl EffectiveBreaker {
    /// Whether a status counts as a failure for this breaker.
    pub fn counts_as_failure(&self, status: u16) -> bool {
        self.http_status.contains(&status)
    }
}

/// Merges a stage breaker policy with its shared pool entry.
pub fn effective_breaker(
    stage_name: &str,
    stage_policy: Option<&CircuitBreakerPolicy>,
    retry: Option<&EffectiveRetry>,
    pools: &ResiliencePools,
) -> Option<EffectiveBreaker> {
    let stage_policy = stage_policy?;
    let pool_policy = stage_policy
        .pool_ref
        .as_deref()
        .and_then(|name| get_ignore_case(&pools.circuit_breakers, name));

    let failure_threshold = stage_policy
        .failure_threshold
        .or_else(|| pool_policy.and_then(|pool| pool.failure_threshold))?;
    let break_ms = stage_policy.break_ms.or_else(|| pool_policy.and_then(|pool| pool.break_ms))?;
    let close_on_success_attempts = stage_policy
        .close_on_success_attempts
        .or_else(|| pool_policy.and_then(|pool| pool.close_on_success_attempts))
        .unwrap_or(DEFAULT_CLOSE_ON_SUCCESS_ATTEMPTS);

    let on_open = stage_policy
        .messages
        .as_ref()
        .and_then(|messages| messages.on_open.clone())
        .or_else(|| pool_policy.and_then(|pool| pool.messages.as_ref()).and_then(|messages| messages.on_open.clone()));
    let on_blocked = stage_policy
        .messages
        .as_ref()
        .and_then(|messages| messages.on_blocked.clone())
        .or_else(|| {
            pool_policy
                .and_then(|pool| pool.messages.as_ref())
                .and_then(|messages| messages.on_blocked.clone())
        });

    Some(EffectiveBreaker {
        key: stage_policy.pool_ref.clone().unwrap_or_else(|| stage_name.to_string()),
        failure_threshold,
        break_ms,
        close_on_success_attempts,
        http_status: retry.map(|retry| retry.http_status.clone()).unwrap_or_default(),
        on_open,
        on_blocked,
    })
}

/// What happened to the breaker after recording a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    /// Nothing externally observable changed.
    None,
    /// The breaker opened (or re-opened from half-open).
    Opened,
    /// The breaker fully closed after enough half-open successes.
    Closed,
}

/// Live state of one circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakerState {
    consecutive_failures: u32,
    consecutive_successes: u32,
    open_until: Option<DateTime<Utc>>,
    half_open: bool,
}

impl BreakerState {
    /// Checks whether traffic is currently blocked.
    ///
    /// Crossing `open_until` flips the breaker to half-open and resets both
    /// counters; the caller's request is then allowed through as the trial.
    pub fn is_blocked(&mut self, now: DateTime<Utc>) -> bool {
        match self.open_until {
            Some(open_until) if open_until > now => true,
            Some(_) => {
                self.open_until = None;
                self.half_open = true;
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                false
            }
            None => false,
        }
    }

    /// Records the final status of a stage attempt.
    pub fn record(&mut self, is_failure: bool, policy: &EffectiveBreaker, now: DateTime<Utc>) -> BreakerTransition {
        if is_failure {
            if self.half_open {
                self.open(policy, now);
                return BreakerTransition::Opened;
            }
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            if self.consecutive_failures >= policy.failure_threshold {
                self.open(policy, now);
                return BreakerTransition::Opened;
            }
            return BreakerTransition::None;
        }

        if self.half_open {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= policy.close_on_success_attempts {
                self.half_open = false;
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                return BreakerTransition::Closed;
            }
            return BreakerTransition::None;
        }

        self.consecutive_failures = 0;
        BreakerTransition::None
    }

    fn open(&mut self, policy: &EffectiveBreaker, now: DateTime<Utc>) {
        self.open_until = Some(now + Duration::milliseconds(policy.break_ms));
        self.half_open = false;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
    }
}
