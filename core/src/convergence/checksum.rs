//! Checksum gate. Decides whether a rendered artifact differs from what is
//! persisted on the target, and therefore whether a restart is needed.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};


// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// SHA-256 over exact artifact bytes, or `Absent` when nothing is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checksum {
    Absent,
    Sha256([u8; 32]),
}

impl Checksum {
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes.as_ref()));
        Checksum::Sha256(digest)
    }

    /// Parse 64 hex characters. Anything else is `None`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(s, &mut digest).ok()?;
        Some(Checksum::Sha256(digest))
    }

    /// Interpret the output of a remote checksum probe (`sha256sum` or
    /// `Get-FileHash` style: digest first, optional trailing columns).
    /// Missing or unparseable output counts as absent.
    pub fn from_probe(output: Option<&str>) -> Self {
        output
            .and_then(|out| out.split_whitespace().next())
            .and_then(|token| Checksum::from_hex(&token.to_ascii_lowercase()))
            .unwrap_or(Checksum::Absent)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Checksum::Absent)
    }

    /// Lowercase hex digest; empty for `Absent`.
    pub fn to_hex(&self) -> String {
        match self {
            Checksum::Absent => String::new(),
            Checksum::Sha256(d) => hex::encode(d),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checksum::Absent => write!(f, "<absent>"),
            Checksum::Sha256(_) => write!(f, "{}", self.to_hex()),
        }
    }
}


// ---------------------------------------------------------------------------
// GateDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Persisted content differs (or is missing); replace and restart.
    Restart,
    /// Persisted content already matches; leave the running process alone.
    Unchanged,
}

/// Compare the persisted checksum against the freshly rendered one.
/// An absent persisted file never matches.
pub fn decide(persisted: &Checksum, rendered: &Checksum) -> GateDecision {
    match (persisted, rendered) {
        (Checksum::Sha256(p), Checksum::Sha256(r)) if p == r => GateDecision::Unchanged,
        _ => GateDecision::Restart,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            Checksum::of("").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let a = Checksum::of("[Unit]\nDescription=Habitat Supervisor\n");
        let b = Checksum::of(String::from("[Unit]\nDescription=Habitat Supervisor\n"));
        assert_eq!(a, b);
    }

    #[test]
    fn any_byte_difference_changes_hash() {
        let a = Checksum::of("ExecStart=/bin/hab sup run --no-color\n");
        let b = Checksum::of("ExecStart=/bin/hab sup run --no-color \n");
        let c = Checksum::of("ExecStart=/bin/hab sup run --no-color");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hex_round_trip() {
        let sum = Checksum::of("payload");
        assert_eq!(Checksum::from_hex(&sum.to_hex()), Some(sum));
        assert_eq!(Checksum::from_hex("xyz"), None);
        assert_eq!(Checksum::from_hex(""), None);
    }

    #[test]
    fn probe_output_parsing() {
        let sum = Checksum::of("unit");
        let sha256sum_line = format!("{}  /etc/systemd/system/hab-sup.service\n", sum.to_hex());
        assert_eq!(Checksum::from_probe(Some(&sha256sum_line)), sum);

        let upper = sum.to_hex().to_ascii_uppercase();
        assert_eq!(Checksum::from_probe(Some(&upper)), sum);

        assert_eq!(Checksum::from_probe(None), Checksum::Absent);
        assert_eq!(Checksum::from_probe(Some("")), Checksum::Absent);
        assert_eq!(Checksum::from_probe(Some("garbage")), Checksum::Absent);
    }

    #[test]
    fn absent_never_matches() {
        let rendered = Checksum::of("unit");
        assert_eq!(decide(&Checksum::Absent, &rendered), GateDecision::Restart);
        assert_eq!(decide(&Checksum::Absent, &Checksum::Absent), GateDecision::Restart);
    }

    #[test]
    fn matching_checksum_skips_restart() {
        let rendered = Checksum::of("unit");
        assert_eq!(decide(&Checksum::of("unit"), &rendered), GateDecision::Unchanged);
        assert_eq!(decide(&Checksum::of("unit2"), &rendered), GateDecision::Restart);
    }
}
