//! Error taxonomy for a convergence run.
//!
//! `SessionError` is what a transport reports; `ProvisionError` is what the
//! orchestrator surfaces. Best-effort probes never build either of these:
//! their failing result is the expected negative signal.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = ProvisionError> = core::result::Result<T, E>;


// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Failure reported by a [`Session`](crate::infrastructure::Session).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("remote command exited with status {code}")]
    Exit { code: i32 },
    #[error("transport: {0}")]
    Transport(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}


// ---------------------------------------------------------------------------
// WaitError
// ---------------------------------------------------------------------------

/// Why a health wait stopped before the probe reported ready.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("cancelled after {attempts} probe(s)")]
    Cancelled { attempts: u32 },
    #[error("deadline exceeded after {attempts} probe(s) ({waited:?})")]
    DeadlineExceeded { attempts: u32, waited: Duration },
}


// ---------------------------------------------------------------------------
// ConfigFault
// ---------------------------------------------------------------------------

/// A single configuration problem, detected before any remote interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFault {
    /// Dotted path of the offending field (e.g. `services[0].url`).
    pub field: String,
    pub message: String,
}

impl ConfigFault {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigFault {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}


// ---------------------------------------------------------------------------
// ServiceFailure
// ---------------------------------------------------------------------------

/// A per-service convergence failure collected by the orchestrator.
#[derive(Debug)]
pub struct ServiceFailure {
    /// Package identifier of the service, `origin/name`.
    pub service: String,
    pub error: ProvisionError,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}


// ---------------------------------------------------------------------------
// ProvisionError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid configuration: {}", join(.0, "; "))]
    Config(Vec<ConfigFault>),
    #[error("unsupported connection type: {0}")]
    UnsupportedPlatform(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("could not connect to {target} after {attempts} attempt(s): {reason}")]
    Connect {
        target: String,
        attempts: u32,
        reason: String,
    },
    #[error("error executing command {command:?}: {source}")]
    Command {
        command: String,
        #[source]
        source: SessionError,
    },
    #[error("error uploading {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: SessionError,
    },
    #[error("waiting for {service} to become healthy: {source}")]
    HealthWait {
        service: String,
        #[source]
        source: WaitError,
    },
    #[error("{} service(s) failed to converge: {}", .failures.len(), join(.failures, "; "))]
    Convergence {
        failures: Vec<ServiceFailure>,
        /// Services that did converge in the same run.
        converged: Vec<String>,
    },
}

impl ProvisionError {
    /// A single-fault configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config(vec![ConfigFault::new(field, message)])
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_lists_every_fault() {
        let err = ProvisionError::Config(vec![
            ConfigFault::new("url", "scheme must be specified"),
            ConfigFault::new("ring_key", "required when ring_key_content is set"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("url: scheme must be specified"));
        assert!(msg.contains("ring_key: required when ring_key_content is set"));
    }

    #[test]
    fn command_error_carries_command_text() {
        let err = ProvisionError::Command {
            command: "hab pkg install core/redis".into(),
            source: SessionError::Exit { code: 1 },
        };
        let msg = err.to_string();
        assert!(msg.contains("hab pkg install core/redis"));
        assert!(msg.contains("status 1"));
    }

    #[test]
    fn convergence_error_counts_failures() {
        let err = ProvisionError::Convergence {
            failures: vec![
                ServiceFailure {
                    service: "core/a".into(),
                    error: ProvisionError::unsupported("x"),
                },
                ServiceFailure {
                    service: "core/b".into(),
                    error: ProvisionError::unsupported("y"),
                },
            ],
            converged: vec!["core/c".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 service(s) failed"));
        assert!(msg.contains("core/a: unsupported: x"));
        assert!(msg.contains("core/b: unsupported: y"));
    }
}
