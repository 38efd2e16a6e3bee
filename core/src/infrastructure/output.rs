//! Remote output forwarding.
//!
//! Every line a remote command writes to stdout or stderr is forwarded to an
//! `OutputSink` as it arrives. `drain_concurrently` reads both streams at
//! the same time so a chatty stderr can never stall a blocked stdout.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::Mutex;
use std::thread;

/// Receives remote output one line at a time.
pub trait OutputSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Forwards lines to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::info!(target: "hab_provision::remote", "{}", line);
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(line.to_string());
    }
}

/// Read `stdout` and `stderr` to completion on two threads, forwarding each
/// line to `sink`. Returns the captured stdout.
pub fn drain_concurrently<O, E>(stdout: O, stderr: E, sink: &dyn OutputSink) -> io::Result<String>
where
    O: Read + Send,
    E: Read + Send,
{
    thread::scope(|scope| {
        let err_reader = scope.spawn(move || forward(stderr, sink, None));
        let mut captured = String::new();
        let out_result = forward(stdout, sink, Some(&mut captured));
        let err_result = err_reader
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
        out_result?;
        err_result?;
        Ok(captured)
    })
}

fn forward<R: Read>(stream: R, sink: &dyn OutputSink, mut capture: Option<&mut String>) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(out) = capture.as_deref_mut() {
            out.push_str(&line);
        }
        sink.line(line.trim_end_matches(['\n', '\r']));
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_lines() {
        let sink = MemorySink::new();
        sink.line("one");
        sink.line("two");
        assert_eq!(sink.lines(), vec!["one", "two"]);
    }

    #[test]
    fn drain_forwards_both_streams_and_captures_stdout() {
        let sink = MemorySink::new();
        let stdout: &[u8] = b"out 1\nout 2\n";
        let stderr: &[u8] = b"err 1\r\n";
        let captured = drain_concurrently(stdout, stderr, &sink).unwrap();
        assert_eq!(captured, "out 1\nout 2\n");

        let mut lines = sink.lines();
        lines.sort();
        assert_eq!(lines, vec!["err 1", "out 1", "out 2"]);
    }

    #[test]
    fn drain_keeps_unterminated_last_line() {
        let sink = MemorySink::new();
        let stdout: &[u8] = b"a\nb";
        let captured = drain_concurrently(stdout, io::empty(), &sink).unwrap();
        assert_eq!(captured, "a\nb");
        assert_eq!(sink.lines(), vec!["a", "b"]);
    }

    #[test]
    fn drain_tolerates_invalid_utf8() {
        let sink = MemorySink::new();
        let stdout: &[u8] = b"ok\xff\n";
        drain_concurrently(stdout, io::empty(), &sink).unwrap();
        assert_eq!(sink.lines().len(), 1);
    }
}
