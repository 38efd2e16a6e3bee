//! Option composer: pure functions from configuration records to
//! deterministic command-line flag strings.
//!
//! Nothing here touches a session. Identical input always yields an
//! identical token sequence, which matters because the supervisor options
//! end up inside a hashed artifact.

pub mod event_stream;
pub mod service;
pub mod supervisor;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use service::{install_options, load_options};
pub use supervisor::supervisor_options;


// ---------------------------------------------------------------------------
// OptionString
// ---------------------------------------------------------------------------

/// An ordered sequence of flag tokens.
///
/// Renders with a leading space before every token so it can be appended
/// directly after a command (`hab sup run` + options).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionString {
    tokens: Vec<String>,
}

impl OptionString {
    pub fn new() -> Self {
        OptionString { tokens: Vec::new() }
    }

    /// Append a bare flag, e.g. `--auto-update`.
    pub fn flag(&mut self, name: &str) -> &mut Self {
        self.tokens.push(format!("--{}", name));
        self
    }

    /// Append a bare flag only when `set` is true.
    pub fn toggle(&mut self, name: &str, set: bool) -> &mut Self {
        if set {
            self.flag(name);
        }
        self
    }

    /// Append `--name value`.
    pub fn value(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.flag(name);
        self.tokens.push(value.to_string());
        self
    }

    /// Append `--name value` when a value is present.
    pub fn optional(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.value(name, v);
        }
        self
    }

    /// Append one `--name value` pair per element, in order.
    pub fn repeated<T: fmt::Display>(&mut self, name: &str, values: &[T]) -> &mut Self {
        for v in values {
            self.value(name, v);
        }
        self
    }

    pub fn extend(&mut self, other: OptionString) -> &mut Self {
        self.tokens.extend(other.tokens);
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for OptionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, " {}", token)?;
        }
        Ok(())
    }
}
