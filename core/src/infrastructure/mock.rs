//! Mock session for testing.
//!
//! Records every command and upload, and serves responses chosen by
//! substring match, making it easy to write deterministic tests for the
//! backends and the orchestrator without a real host.

use crate::error::SessionError;

use super::{OutputSink, Session};

/// A test-double that records commands and uploads.
#[derive(Debug, Default)]
pub struct MockSession {
    /// All commands run against this session, in order.
    pub commands: Vec<String>,
    /// All uploads, in order, as `(path, contents)`.
    pub uploads: Vec<(String, Vec<u8>)>,
    /// Number of `connect` calls made.
    pub connect_attempts: u32,
    /// Commands or upload paths containing any of these substrings fail.
    failures: Vec<String>,
    /// Canned stdout, keyed by command substring. First match wins.
    responses: Vec<(String, String)>,
    /// How many leading `connect` calls should fail.
    connect_failures: u32,
    disconnected: bool,
}

impl MockSession {
    pub fn new() -> Self {
        MockSession::default()
    }

    /// Make commands (and upload paths) containing `pattern` fail with exit 1.
    pub fn fail_when(&mut self, pattern: &str) -> &mut Self {
        self.failures.push(pattern.to_string());
        self
    }

    /// Return `stdout` for commands containing `pattern`.
    pub fn respond_when(&mut self, pattern: &str, stdout: &str) -> &mut Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Fail the first `n` connect attempts.
    pub fn fail_connects(&mut self, n: u32) -> &mut Self {
        self.connect_failures = n;
        self
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands.iter().filter(|c| c.contains(pattern)).count()
    }

    /// Index of the first command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.contains(pattern))
    }

    /// Contents of the most recent upload to `path`.
    pub fn uploaded(&self, path: &str) -> Option<&[u8]> {
        self.uploads
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_slice())
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn fails(&self, subject: &str) -> bool {
        self.failures.iter().any(|f| subject.contains(f.as_str()))
    }
}

impl Session for MockSession {
    fn target(&self) -> String {
        "mock".to_string()
    }

    fn connect(&mut self) -> Result<(), SessionError> {
        self.connect_attempts += 1;
        if self.connect_attempts <= self.connect_failures {
            return Err(SessionError::transport("connection refused"));
        }
        self.disconnected = false;
        Ok(())
    }

    fn run_command(&mut self, cmd: &str, sink: &dyn OutputSink) -> Result<String, SessionError> {
        self.commands.push(cmd.to_string());
        if self.fails(cmd) {
            return Err(SessionError::Exit { code: 1 });
        }
        let stdout = self
            .responses
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        for line in stdout.lines() {
            sink.line(line);
        }
        Ok(stdout)
    }

    fn upload(&mut self, path: &str, contents: &[u8]) -> Result<(), SessionError> {
        if self.fails(path) {
            return Err(SessionError::transport(format!("cannot write {}", path)));
        }
        self.uploads.push((path.to_string(), contents.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemorySink;

    #[test]
    fn records_commands_in_order() {
        let mut mock = MockSession::new();
        let sink = MemorySink::new();
        mock.run_command("hab pkg install core/redis", &sink).unwrap();
        mock.run_command("hab svc load core/redis", &sink).unwrap();
        assert_eq!(mock.commands, vec!["hab pkg install core/redis", "hab svc load core/redis"]);
        assert_eq!(mock.position("hab svc load"), Some(1));
        assert_eq!(mock.count("core/redis"), 2);
    }

    #[test]
    fn canned_response_is_forwarded_to_sink() {
        let mut mock = MockSession::new();
        mock.respond_when("hab svc status", "package  type  state\ncore/redis  standalone  up\n");
        let sink = MemorySink::new();
        let out = mock.run_command("hab svc status", &sink).unwrap();
        assert!(out.starts_with("package"));
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn failures_match_by_substring() {
        let mut mock = MockSession::new();
        mock.fail_when("id hab");
        let sink = MemorySink::new();
        let err = mock.run_command("hab pkg exec core/busybox id hab", &sink).unwrap_err();
        assert!(matches!(err, SessionError::Exit { code: 1 }));
        assert!(mock.ran("id hab"));
    }

    #[test]
    fn connect_failures_then_success() {
        let mut mock = MockSession::new();
        mock.fail_connects(2);
        assert!(mock.connect().is_err());
        assert!(mock.connect().is_err());
        assert!(mock.connect().is_ok());
        assert_eq!(mock.connect_attempts, 3);
    }

    #[test]
    fn uploads_are_recorded() {
        let mut mock = MockSession::new();
        mock.upload("/tmp/a", b"one").unwrap();
        mock.upload("/tmp/a", b"two").unwrap();
        assert_eq!(mock.uploaded("/tmp/a"), Some(&b"two"[..]));
        assert_eq!(mock.uploaded("/tmp/b"), None);
    }

    #[test]
    fn disconnect_is_tracked() {
        let mut mock = MockSession::new();
        mock.connect().unwrap();
        mock.disconnect();
        assert!(mock.is_disconnected());
    }
}
