//! Connect with retry.
//!
//! Transient connection failures are retried with backoff until the
//! overall timeout elapses, the retry budget runs out, or the run is
//! cancelled.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::convergence::{CancelToken, RetryPolicy};
use crate::error::{ProvisionError, Result};

use super::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPolicy {
    /// Total time allowed across all attempts.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        ConnectPolicy {
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub target: String,
    pub attempts: u32,
    pub latency_ms: u64,
}

pub fn connect_with_retry(
    session: &mut dyn Session,
    policy: &ConnectPolicy,
    cancel: &CancelToken,
) -> Result<ConnectionInfo> {
    let target = session.target();
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let err = match session.connect() {
            Ok(()) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                tracing::info!(host = %target, attempts, latency_ms, "connected");
                return Ok(ConnectionInfo {
                    target,
                    attempts,
                    latency_ms,
                });
            }
            Err(e) => e,
        };

        let retry = attempts - 1;
        let delay = policy.retry.delay(retry);
        let give_up = |reason: String| ProvisionError::Connect {
            target: target.clone(),
            attempts,
            reason,
        };
        if !policy.retry.should_retry(retry) {
            return Err(give_up(err.to_string()));
        }
        if started.elapsed() + delay > policy.timeout {
            return Err(give_up(format!("timed out after {:?}: {}", policy.timeout, err)));
        }
        tracing::warn!(host = %target, attempt = attempts, error = %err, "connect failed, retrying in {:?}", delay);
        if !cancel.sleep(delay) {
            return Err(give_up("cancelled".to_string()));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::BackoffStrategy;
    use crate::infrastructure::MockSession;

    fn quick(max_retries: Option<u32>) -> ConnectPolicy {
        ConnectPolicy {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(max_retries, BackoffStrategy::Fixed, 1),
        }
    }

    #[test]
    fn first_attempt_succeeds() {
        let mut session = MockSession::new();
        let info = connect_with_retry(&mut session, &quick(None), &CancelToken::new()).unwrap();
        assert_eq!(info.attempts, 1);
        assert_eq!(info.target, "mock");
    }

    #[test]
    fn transient_failures_are_retried() {
        let mut session = MockSession::new();
        session.fail_connects(3);
        let info = connect_with_retry(&mut session, &quick(None), &CancelToken::new()).unwrap();
        assert_eq!(info.attempts, 4);
    }

    #[test]
    fn retry_budget_exhausted() {
        let mut session = MockSession::new();
        session.fail_connects(10);
        let err = connect_with_retry(&mut session, &quick(Some(2)), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ProvisionError::Connect { attempts: 3, .. }));
    }

    #[test]
    fn overall_timeout_bounds_retries() {
        let mut session = MockSession::new();
        session.fail_connects(u32::MAX);
        let policy = ConnectPolicy {
            timeout: Duration::from_millis(30),
            retry: RetryPolicy::new(None, BackoffStrategy::Fixed, 10),
        };
        let err = connect_with_retry(&mut session, &policy, &CancelToken::new()).unwrap_err();
        match err {
            ProvisionError::Connect { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cancel_stops_retrying() {
        let mut session = MockSession::new();
        session.fail_connects(u32::MAX);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = connect_with_retry(&mut session, &quick(None), &cancel).unwrap_err();
        match err {
            ProvisionError::Connect { attempts, reason, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(reason, "cancelled");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
