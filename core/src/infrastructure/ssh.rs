//! SSH transport built on the system `ssh` client.
//!
//! Every command runs in its own `ssh` invocation (BatchMode, so a missing
//! key fails fast instead of prompting). Uploads pipe the contents through
//! `cat` on the far side.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

use super::output::drain_concurrently;
use super::{OutputSink, Session};


// ---------------------------------------------------------------------------
// SshTarget
// ---------------------------------------------------------------------------

/// SSH coordinates for a single host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Path to an SSH private key, if not using the default.
    pub ssh_key: Option<String>,
    /// Per-attempt TCP connect timeout passed to `ssh`.
    pub connect_timeout_secs: u32,
}

impl SshTarget {
    pub fn new(host: &str, user: &str) -> Self {
        SshTarget {
            host: host.to_string(),
            port: 22,
            user: user.to_string(),
            ssh_key: None,
            connect_timeout_secs: 10,
        }
    }

    /// Build the `user@host` string used in SSH commands.
    pub fn user_at_host(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Build base SSH arguments (port, options, key, user@host) without a command.
    pub fn ssh_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        if let Some(ref key) = self.ssh_key {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(self.user_at_host());
        args
    }
}


// ---------------------------------------------------------------------------
// SshSession
// ---------------------------------------------------------------------------

pub struct SshSession {
    target: SshTarget,
}

impl SshSession {
    pub fn new(target: SshTarget) -> Self {
        SshSession { target }
    }

    fn command(&self, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.target.ssh_base_args()).arg(remote_cmd);
        cmd
    }
}

/// Quote `s` as a single POSIX shell word.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn exit_error(status: std::process::ExitStatus) -> SessionError {
    match status.code() {
        // ssh reserves 255 for its own failures
        Some(255) => SessionError::transport("ssh exited with status 255"),
        Some(code) => SessionError::Exit { code },
        None => SessionError::transport("ssh terminated by signal"),
    }
}

impl Session for SshSession {
    fn target(&self) -> String {
        format!("{}:{}", self.target.user_at_host(), self.target.port)
    }

    fn connect(&mut self) -> Result<(), SessionError> {
        let output = self
            .command("true")
            .stdin(Stdio::null())
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SessionError::transport(stderr.trim().to_string()))
        }
    }

    fn run_command(&mut self, cmd: &str, sink: &dyn OutputSink) -> Result<String, SessionError> {
        let mut child = self
            .command(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::transport("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::transport("stderr not captured"))?;
        let captured = drain_concurrently(stdout, stderr, sink)?;
        let status = child.wait()?;
        if status.success() {
            Ok(captured)
        } else {
            Err(exit_error(status))
        }
    }

    fn upload(&mut self, path: &str, contents: &[u8]) -> Result<(), SessionError> {
        let mut child = self
            .command(&format!("cat > {}", shell_quote(path)))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents)?;
        }
        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(path = %path, stderr = %stderr.trim(), "upload failed");
            Err(exit_error(output.status))
        }
    }
}
