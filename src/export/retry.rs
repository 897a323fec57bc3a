//! Retry policy for page requests
//!
//! [`RetryPolicy::decide`] is a pure function from a classified failure and the
//! attempt number to a [`RetryDecision`]. [`with_retry`] wraps an async unit of
//! work with a per-attempt timeout and applies the policy around it.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Default number of attempts per page request
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Classification of a failed request
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Connection reset, DNS failure and similar
    TransientNetwork,
    /// The request did not complete within the timeout
    TransientTimeout,
    /// The source asked us to slow down
    RateLimited { retry_after: Option<Duration> },
    /// The source refused access
    PermissionDenied,
    /// Anything else
    Unknown,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { after: Duration },
    Abort(FetchError),
}

/// Backoff settings for each failure class
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    network_base_delay: Duration,
    timeout_base_delay: Duration,
    max_delay: Duration,
    default_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            network_base_delay: Duration::from_secs_f64(config.network_base_delay),
            timeout_base_delay: Duration::from_secs_f64(config.timeout_base_delay),
            max_delay: Duration::from_secs_f64(config.max_delay),
            default_rate_limit_wait: Duration::from_secs_f64(config.default_rate_limit_wait),
        }
    }

    /// Decide whether a failed attempt should be retried
    ///
    /// # Arguments
    /// * `kind` - Classified failure
    /// * `attempt` - 1-based number of the attempt that just failed
    /// * `max_attempts` - Attempt budget for this request
    /// * `message` - Source-provided description, kept in terminal errors
    ///
    /// # Returns
    /// * `RetryDecision` - Backoff to wait, or the terminal error
    pub fn decide(
        &self,
        kind: &FailureKind,
        attempt: u32,
        max_attempts: u32,
        message: &str,
    ) -> RetryDecision {
        if *kind == FailureKind::PermissionDenied {
            return RetryDecision::Abort(FetchError::Permission(message.to_string()));
        }

        if attempt >= max_attempts {
            let error = match kind {
                FailureKind::TransientTimeout => FetchError::Timeout { attempts: attempt },
                FailureKind::RateLimited { .. } => {
                    FetchError::RateLimitExhausted { attempts: attempt }
                }
                _ => FetchError::Unknown {
                    attempts: attempt,
                    message: message.to_string(),
                },
            };
            return RetryDecision::Abort(error);
        }

        let after = match kind {
            FailureKind::RateLimited { retry_after } => {
                retry_after.unwrap_or(self.default_rate_limit_wait)
            }
            FailureKind::TransientTimeout => self.linear(self.timeout_base_delay, attempt),
            _ => self.linear(self.network_base_delay, attempt),
        };

        RetryDecision::Retry { after }
    }

    fn linear(&self, base: Duration, attempt: u32) -> Duration {
        base.saturating_mul(attempt).min(self.max_delay)
    }
}

/// A failed attempt as reported by a unit of work
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
    fn message(&self) -> String;
}

/// Run `op` until it succeeds or the policy gives up
///
/// Each attempt is bounded by `timeout`; an elapsed timeout counts as
/// [`FailureKind::TransientTimeout`]. Backoff sleeps end early on
/// cancellation, in which case `Ok(None)` is returned. An in-flight attempt
/// is never interrupted.
///
/// # Arguments
/// * `policy` - Retry policy to consult after each failure
/// * `max_attempts` - Attempt budget
/// * `timeout` - Per-attempt timeout
/// * `cancel` - Cancellation token observed while backing off
/// * `op` - Factory producing one attempt
///
/// # Returns
/// * `Result<Option<T>, FetchError>` - Value, `None` if cancelled, or terminal error
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    max_attempts: u32,
    timeout: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<Option<T>, FetchError>
where
    E: Classify,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let (kind, message) = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(Some(value)),
            Ok(Err(e)) => (e.failure_kind(), e.message()),
            Err(_) => (
                FailureKind::TransientTimeout,
                format!("request exceeded {:.1}s", timeout.as_secs_f64()),
            ),
        };

        match policy.decide(&kind, attempt, max_attempts, &message) {
            RetryDecision::Abort(error) => {
                warn!("Giving up after attempt {}: {}", attempt, error);
                return Err(error);
            }
            RetryDecision::Retry { after } => {
                warn!(
                    "Attempt {}/{} failed ({:?}: {}), retrying in {:.2}s",
                    attempt,
                    max_attempts,
                    kind,
                    message,
                    after.as_secs_f64()
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Retry backoff interrupted by cancellation");
                        return Ok(None);
                    }
                    _ = tokio::time::sleep(after) => {}
                }
            }
        }
    }
}
