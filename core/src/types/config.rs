use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::service::Service;
use crate::data::validate::Faults;
use crate::error::Result;

/// Default version pin; installs whatever the channel currently serves.
pub const LATEST: &str = "latest";


// ---------------------------------------------------------------------------
// ServiceManager
// ---------------------------------------------------------------------------

/// How the supervisor process itself is kept alive on the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceManager {
    /// Registered with the host service manager (systemd, Windows SCM).
    #[default]
    Managed,
    /// Launched as a detached process; not idempotent.
    Unmanaged,
}

impl ServiceManager {
    /// Accepts `systemd` as the historical name of the managed mode.
    pub fn parse(s: &str) -> Option<ServiceManager> {
        match s {
            "systemd" | "managed" => Some(ServiceManager::Managed),
            "unmanaged" => Some(ServiceManager::Unmanaged),
            _ => None,
        }
    }
}


// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStream {
    pub application: String,
    pub environment: String,
    pub connect_timeout: u32,
    /// Free-form metadata. Rendered sorted by key.
    pub meta: HashMap<String, String>,
    pub server_certificate: Option<String>,
    pub site: Option<String>,
    pub token: String,
    pub url: String,
}


// ---------------------------------------------------------------------------
// ProvisionerConfig
// ---------------------------------------------------------------------------

/// Supervisor-level desired state for one target host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub version: String,
    pub license: Option<String>,
    pub auto_update: bool,
    pub http_disable: bool,
    pub permanent_peer: bool,
    pub listen_ctl: Option<String>,
    pub listen_gossip: Option<String>,
    pub listen_http: Option<String>,
    pub peers: Vec<String>,
    pub ring_key: Option<String>,
    pub ring_key_content: Option<String>,
    pub ctl_secret: Option<String>,
    pub skip_install: bool,
    pub use_sudo: bool,
    pub service_manager: ServiceManager,
    pub service_name: String,
    pub url: Option<String>,
    pub channel: Option<String>,
    pub events: Option<String>,
    pub organization: Option<String>,
    pub gateway_auth_token: Option<String>,
    pub builder_auth_token: Option<String>,
    pub event_stream: Option<EventStream>,
    pub services: Vec<Service>,
}

impl ProvisionerConfig {
    /// Whether a non-`latest` version pin was requested.
    pub fn pinned_version(&self) -> Option<&str> {
        match self.version.as_str() {
            "" | LATEST => None,
            v => Some(v),
        }
    }

    /// Check the invariants a run relies on, reporting every violation
    /// together. Records built by the YAML loader already pass.
    pub fn validate(&self) -> Result<()> {
        let mut faults = Faults::new();
        faults.ring_key(self.ring_key.as_deref(), self.ring_key_content.as_deref());
        faults.url("url", self.url.as_deref());
        if let Some(es) = &self.event_stream {
            faults.event_stream(es);
        }
        for (i, svc) in self.services.iter().enumerate() {
            faults.url(&format!("services[{}].url", i), svc.url.as_deref());
            faults.key_name(&format!("services[{}].service_key", i), svc.service_key.as_deref());
        }
        faults.finish(())
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        ProvisionerConfig {
            version: LATEST.into(),
            license: None,
            auto_update: false,
            http_disable: false,
            permanent_peer: false,
            listen_ctl: None,
            listen_gossip: None,
            listen_http: None,
            peers: Vec::new(),
            ring_key: None,
            ring_key_content: None,
            ctl_secret: None,
            skip_install: false,
            use_sudo: true,
            service_manager: ServiceManager::Managed,
            service_name: "hab-supervisor".into(),
            url: None,
            channel: None,
            events: None,
            organization: None,
            gateway_auth_token: None,
            builder_auth_token: None,
            event_stream: None,
            services: Vec::new(),
        }
    }
}
