// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payload read retry policy with exponential backoff + jitter.
//
// Only the read half of a relay is ever retried, and only for errors
// classified Transient. Submissions are never retried: a relay is delivered
// at most once.

use std::time::Duration;

use printmirror_core::error::ProviderError;
use printmirror_core::types::ErrorClass;
use tracing::debug;

/// Read retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetryPolicy {
    /// Extra attempts after the first read.
    pub max_retries: u32,
    /// Base delay between attempts (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry, the error is not transient.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a provider error for retry decisions.
pub fn classify_provider_error(err: &ProviderError) -> ErrorClass {
    match err {
        // The spooler is still writing, or briefly locked the file.
        ProviderError::Busy(_) | ProviderError::EmptyPayload { .. } => ErrorClass::Transient,

        ProviderError::AccessDenied(_) | ProviderError::QueueNotFound(_) => ErrorClass::UserAction,

        ProviderError::JobNotFound { .. }
        | ProviderError::Rejected(_)
        | ProviderError::Unavailable(_) => ErrorClass::Permanent,

        ProviderError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => ErrorClass::Permanent,
            std::io::ErrorKind::PermissionDenied => ErrorClass::UserAction,
            _ => ErrorClass::Transient,
        },
    }
}

/// Decide whether to retry a failed read based on the error class and the
/// number of attempts already retried.
pub fn should_retry(err: &ProviderError, attempt: u32, policy: &ReadRetryPolicy) -> RetryDecision {
    match classify_provider_error(err) {
        ErrorClass::Transient => {
            if attempt >= policy.max_retries {
                debug!(attempt, max = policy.max_retries, "read retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, policy);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling read retry");
                RetryDecision::RetryAfter(delay)
            }
        }
        class => RetryDecision::GiveUp(class),
    }
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, policy: &ReadRetryPolicy) -> Duration {
    let base_ms = policy.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    Duration::from_millis(total_ms.min(policy.max_delay.as_millis() as u64))
}

/// Deterministic spread across [0, base).
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}
