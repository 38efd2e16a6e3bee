//! Remote session plumbing.
//!
//! `Session` is the transport seam: a connected channel that runs one shell
//! command at a time and uploads file contents. `SshSession` is the
//! production implementation and `MockSession` the test double. `Remote`
//! wraps a session with the error mapping and probe semantics the backends
//! rely on.

pub mod connect;
pub mod mock;
pub mod output;
pub mod ssh;

pub use connect::{connect_with_retry, ConnectPolicy, ConnectionInfo};
pub use mock::MockSession;
pub use output::{drain_concurrently, MemorySink, OutputSink, TracingSink};
pub use ssh::{SshSession, SshTarget};

use crate::error::{ProvisionError, Result, SessionError};


// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A connected channel to one target host.
pub trait Session {
    /// Human-readable target, used in logs and connect errors.
    fn target(&self) -> String;

    /// Establish (or verify) the channel. Called repeatedly by
    /// `connect_with_retry` until it succeeds.
    fn connect(&mut self) -> std::result::Result<(), SessionError>;

    /// Run one command, forwarding each output line to `sink`. Returns the
    /// captured stdout. A non-zero exit is an error.
    fn run_command(&mut self, cmd: &str, sink: &dyn OutputSink) -> std::result::Result<String, SessionError>;

    /// Write `contents` to `path` on the target.
    fn upload(&mut self, path: &str, contents: &[u8]) -> std::result::Result<(), SessionError>;

    fn disconnect(&mut self) {}
}


// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// A session paired with its output sink for the duration of a run.
pub struct Remote<'a> {
    session: &'a mut dyn Session,
    sink: &'a dyn OutputSink,
}

impl<'a> Remote<'a> {
    pub fn new(session: &'a mut dyn Session, sink: &'a dyn OutputSink) -> Self {
        Remote { session, sink }
    }

    /// Run a command whose failure aborts the current step.
    pub fn run(&mut self, cmd: &str) -> Result<String> {
        tracing::debug!(command = %cmd, "running remote command");
        self.session
            .run_command(cmd, self.sink)
            .map_err(|source| ProvisionError::Command {
                command: cmd.to_string(),
                source,
            })
    }

    /// Run a probe. A failing probe is the expected negative answer.
    pub fn probe(&mut self, cmd: &str) -> bool {
        self.probe_output(cmd).is_some()
    }

    /// Run a probe and keep its stdout when it succeeds.
    pub fn probe_output(&mut self, cmd: &str) -> Option<String> {
        match self.session.run_command(cmd, self.sink) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!(command = %cmd, error = %e, "probe negative");
                None
            }
        }
    }

    /// Run a command whose failure is tolerated.
    pub fn best_effort(&mut self, cmd: &str) {
        if let Err(e) = self.session.run_command(cmd, self.sink) {
            tracing::debug!(command = %cmd, error = %e, "ignoring failure");
        }
    }

    pub fn upload(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        tracing::debug!(path = %path, bytes = contents.len(), "uploading");
        self.session
            .upload(path, contents)
            .map_err(|source| ProvisionError::Upload {
                path: path.to_string(),
                source,
            })
    }
}
