//! Cancellable waiting.
//!
//! `CancelToken` is a shareable flag whose `sleep` wakes early on cancel.
//! `poll_until` repeats a readiness probe at a fixed interval until it
//! succeeds, the optional deadline passes, or the token is cancelled. With
//! no deadline it blocks until ready, so an external cancel is the only
//! other way out.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::WaitError;


// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between a run and whoever supervises it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|p| p.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for `dur` or until cancelled. Returns `false` if cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, dur, |cancelled| !*cancelled)
            .unwrap_or_else(|p| p.into_inner());
        !*guard
    }
}


// ---------------------------------------------------------------------------
// HealthWait
// ---------------------------------------------------------------------------

/// Polling parameters for a post-restart health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthWait {
    pub interval: Duration,
    /// `None` waits until ready or cancelled.
    pub deadline: Option<Duration>,
}

impl Default for HealthWait {
    fn default() -> Self {
        HealthWait {
            interval: Duration::from_secs(5),
            deadline: None,
        }
    }
}

/// Call `ready` until it returns true. Returns the number of probes made.
pub fn poll_until<F>(wait: &HealthWait, cancel: &CancelToken, mut ready: F) -> Result<u32, WaitError>
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled { attempts });
        }
        attempts += 1;
        if ready() {
            return Ok(attempts);
        }
        if let Some(deadline) = wait.deadline {
            let waited = started.elapsed();
            if waited + wait.interval > deadline {
                return Err(WaitError::DeadlineExceeded { attempts, waited });
            }
        }
        tracing::info!("waiting for supervisor to come back up ...");
        if !cancel.sleep(wait.interval) {
            return Err(WaitError::Cancelled { attempts });
        }
    }
}
