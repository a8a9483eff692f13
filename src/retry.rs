//! Retry logic for client operations with error classification.
//!
//! Classification is the single source of truth for retry eligibility:
//! transport failures and HTTP 5xx are transient, everything else is
//! surfaced immediately.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::StatusCode;

use crate::error::{Error, Operation};

/// A failed attempt, already mapped onto the public taxonomy together with
/// the retry verdict.
#[derive(Debug)]
pub(crate) struct Classified {
    pub error: Error,
    pub retryable: bool,
}

/// Classifies a non-success HTTP status.
///
/// 401/403 always map to [`Error::Authentication`]; 5xx is retryable with
/// the operation's own kind; any other 4xx fails fast.
pub(crate) fn classify_status(op: Operation, status: StatusCode, detail: &str) -> Classified {
    let detail = detail.trim();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let message = if detail.is_empty() {
            "invalid token".to_string()
        } else {
            detail.to_string()
        };
        return Classified {
            error: Error::Authentication {
                message,
                status: Some(status),
            },
            retryable: false,
        };
    }

    let message = if detail.is_empty() {
        format!("service returned HTTP {}", status.as_u16())
    } else {
        format!("service returned HTTP {}: {}", status.as_u16(), detail)
    };

    Classified {
        error: Error::operation(op, message, Some(status), None),
        retryable: status.is_server_error(),
    }
}

/// Classifies a transport-level failure from `reqwest`.
///
/// Timeouts, connection failures and mid-transfer errors are retryable; a
/// body that failed to decode will not improve on a second attempt.
pub(crate) fn classify_transport(op: Operation, err: reqwest::Error) -> Classified {
    let retryable = !(err.is_decode() || err.is_builder() || err.is_redirect());

    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_decode() {
        "malformed response body".to_string()
    } else {
        "request failed".to_string()
    };

    let status = err.status();
    Classified {
        error: Error::operation(op, message, status, Some(err)),
        retryable,
    }
}

/// Classifies an `{"error": ...}` payload carried in a success response.
///
/// The service reports bad credentials this way, so messages mentioning
/// auth or the token map to [`Error::Authentication`].
pub(crate) fn classify_service_error(op: Operation, message: &str) -> Classified {
    let lowered = message.to_ascii_lowercase();
    let error = if lowered.contains("auth") || lowered.contains("token") {
        Error::Authentication {
            message: message.to_string(),
            status: None,
        }
    } else {
        Error::operation(op, message, None, None)
    };
    Classified {
        error,
        retryable: false,
    }
}

/// A structurally valid response that is missing the expected fields.
pub(crate) fn malformed_response(op: Operation, message: &str) -> Classified {
    Classified {
        error: Error::operation(op, message, None, None),
        retryable: false,
    }
}

/// Bounded exponential-backoff retry over a single-attempt operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    /// Maximum retry attempts after the first try; 0 disables retry.
    pub retries: u32,
    /// Multiplier for exponential backoff between attempts.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Delay before retry `n` (1-indexed): `backoff_factor * 2^(n-1)` seconds.
    fn delay(&self, retry: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_factor * 2f64.powi(retry.saturating_sub(1) as i32))
    }

    /// Executes `attempt` up to `retries + 1` times.
    ///
    /// Retries only on failures classified as retryable; the terminal
    /// outcome (success, non-retryable failure, or exhausted budget) is
    /// surfaced unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Classified>>,
    {
        let mut failures = 0;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(outcome) if outcome.retryable && failures < self.retries => {
                    failures += 1;
                    let delay = self.delay(failures);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:.1}s...",
                        operation,
                        failures,
                        self.retries + 1,
                        outcome.error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(outcome) => {
                    debug!(
                        "{}: giving up after {} attempt(s): {}",
                        operation,
                        failures + 1,
                        outcome.error
                    );
                    return Err(outcome.error);
                }
            }
        }
    }
}
