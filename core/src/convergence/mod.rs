//! Convergence primitives.
//!
//! The `checksum` module holds the gate that decides whether a disruptive
//! restart is needed. The `retry` module provides backoff policies for
//! transient faults, and `wait` a cancellable, deadline-bounded poll.

pub mod checksum;
pub mod retry;
pub mod wait;

pub use checksum::{decide, Checksum, GateDecision};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use wait::{poll_until, CancelToken, HealthWait};
