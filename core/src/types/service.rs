//! Managed-service records: package identifiers, binds, topology and
//! update strategy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};


// ---------------------------------------------------------------------------
// PackageIdent
// ---------------------------------------------------------------------------

/// A package identifier of the form `origin/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdent {
    pub origin: String,
    pub name: String,
}

impl PackageIdent {
    pub fn new(origin: &str, name: &str) -> Self {
        PackageIdent {
            origin: origin.to_string(),
            name: name.to_string(),
        }
    }
}

impl FromStr for PackageIdent {
    type Err = String;

    /// Exactly one `/` with a non-empty origin and name on either side.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(origin), Some(name), None) if !origin.is_empty() && !name.is_empty() => {
                Ok(PackageIdent::new(origin, name))
            }
            _ => Err(format!(
                "invalid package identifier '{}' (expected origin/name)",
                s
            )),
        }
    }
}

impl fmt::Display for PackageIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.name)
    }
}


// ---------------------------------------------------------------------------
// Bind
// ---------------------------------------------------------------------------

/// Runtime wiring from a service to a producer `service.group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bind {
    pub alias: String,
    pub service: String,
    pub group: String,
}

impl Bind {
    pub fn new(alias: &str, service: &str, group: &str) -> Self {
        Bind {
            alias: alias.to_string(),
            service: service.to_string(),
            group: group.to_string(),
        }
    }
}

impl FromStr for Bind {
    type Err = String;

    /// Parse an `alias:service.group` token. Separators are `:` and `.`;
    /// empty fields are dropped, and exactly three must remain.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s
            .split(|c| c == ':' || c == '.')
            .filter(|f| !f.is_empty())
            .collect();
        match fields.as_slice() {
            [alias, service, group] => Ok(Bind::new(alias, service, group)),
            _ => Err(format!("invalid bind specification: {}", s)),
        }
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.alias, self.service, self.group)
    }
}


// ---------------------------------------------------------------------------
// Topology / UpdateStrategy
// ---------------------------------------------------------------------------

/// Service-group coordination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    Leader,
    Standalone,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Leader => "leader",
            Topology::Standalone => "standalone",
        }
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leader" => Ok(Topology::Leader),
            "standalone" => Ok(Topology::Standalone),
            other => Err(format!(
                "expected one of [leader standalone], got {}",
                other
            )),
        }
    }
}

/// Rollout policy for package updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    None,
    Rolling,
    AtOnce,
}

impl UpdateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::None => "none",
            UpdateStrategy::Rolling => "rolling",
            UpdateStrategy::AtOnce => "at-once",
        }
    }
}

impl FromStr for UpdateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(UpdateStrategy::None),
            "rolling" => Ok(UpdateStrategy::Rolling),
            "at-once" => Ok(UpdateStrategy::AtOnce),
            other => Err(format!(
                "expected one of [none rolling at-once], got {}",
                other
            )),
        }
    }
}


// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Desired state for one managed service. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub ident: PackageIdent,
    pub topology: Option<Topology>,
    pub strategy: Option<UpdateStrategy>,
    /// Rendered `user.toml` content.
    pub user_toml: Option<String>,
    pub channel: Option<String>,
    pub group: Option<String>,
    pub url: Option<String>,
    pub binds: Vec<Bind>,
    /// Service-group key content; its second line names the key.
    pub service_key: Option<String>,
    pub reload: bool,
    pub unload: bool,
}

impl Service {
    /// A service with only its identifier set.
    pub fn new(ident: PackageIdent) -> Self {
        Service {
            ident,
            topology: None,
            strategy: None,
            user_toml: None,
            channel: None,
            group: None,
            url: None,
            binds: Vec::new(),
            service_key: None,
            reload: false,
            unload: false,
        }
    }

    /// The package name half of the identifier.
    pub fn package_name(&self) -> &str {
        &self.ident.name
    }

    /// Hex SHA-256 of the identifier, used to name staging files.
    pub fn ident_checksum(&self) -> String {
        hex::encode(Sha256::digest(self.ident.to_string().as_bytes()))
    }

    /// User configuration, if any non-blank content was supplied.
    pub fn user_config(&self) -> Option<&str> {
        self.user_toml
            .as_deref()
            .filter(|toml| !toml.trim().is_empty())
    }

    /// The key name carried on the second line of the service-group key.
    pub fn service_key_name(&self) -> Option<&str> {
        self.service_key
            .as_deref()
            .and_then(key_name)
    }
}

/// Second line of a key document, which carries its name.
pub fn key_name(content: &str) -> Option<&str> {
    content
        .split('\n')
        .nth(1)
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
}
