//! Loader for desired-state YAML documents.
//!
//! A document describes the supervisor (`ProvisionerConfig`), its services,
//! and optional per-run `settings`. Loading is all-or-nothing: every
//! problem found is reported together as `ProvisionError::Config`, and
//! nothing is returned unless the whole document is valid.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value;

use crate::convergence::{BackoffStrategy, HealthWait, RetryPolicy};
use crate::error::{ProvisionError, Result};
use crate::infrastructure::ConnectPolicy;
use crate::orchestrator::RunSettings;
use crate::types::config::LATEST;
use crate::types::{Bind, EventStream, ProvisionerConfig, Service, ServiceManager};

use super::validate::{check_shape, Faults};


/// A validated desired-state document.
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub config: ProvisionerConfig,
    pub settings: RunSettings,
}


// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocument {
    version: Option<String>,
    license: Option<String>,
    auto_update: bool,
    http_disable: bool,
    permanent_peer: bool,
    listen_ctl: Option<String>,
    listen_gossip: Option<String>,
    listen_http: Option<String>,
    peers: Vec<String>,
    ring_key: Option<String>,
    ring_key_content: Option<String>,
    ctl_secret: Option<String>,
    skip_install: bool,
    use_sudo: Option<bool>,
    service_type: Option<String>,
    service_name: Option<String>,
    url: Option<String>,
    channel: Option<String>,
    events: Option<String>,
    organization: Option<String>,
    gateway_auth_token: Option<String>,
    builder_auth_token: Option<String>,
    event_stream: Option<RawEventStream>,
    services: Vec<RawService>,
    settings: Option<RawSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEventStream {
    application: Option<String>,
    environment: Option<String>,
    connect_timeout: Option<u32>,
    meta: HashMap<String, Value>,
    server_certificate: Option<String>,
    site: Option<String>,
    token: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawService {
    name: Option<String>,
    binds: Vec<String>,
    bind: Vec<RawBind>,
    topology: Option<String>,
    strategy: Option<String>,
    user_toml: Option<String>,
    channel: Option<String>,
    group: Option<String>,
    url: Option<String>,
    service_key: Option<String>,
    reload: bool,
    unload: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBind {
    alias: String,
    service: String,
    group: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    connect_timeout_secs: Option<u64>,
    retry: Option<RawRetry>,
    health_interval_secs: Option<u64>,
    health_deadline_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRetry {
    strategy: Option<BackoffStrategy>,
    base_delay_ms: Option<u64>,
    max_retries: Option<u32>,
    max_delay_ms: Option<u64>,
}

/// Empty strings mean "not set".
fn opt(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}


// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a desired-state document from a YAML file.
pub fn load(path: &Path) -> Result<DesiredState> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ProvisionError::config(path.display().to_string(), format!("cannot read: {}", e))
    })?;
    parse(&content)
}

/// Parse a desired-state document from a YAML string.
pub fn parse(content: &str) -> Result<DesiredState> {
    let doc: Value = if content.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| ProvisionError::config("document", format!("invalid YAML: {}", e)))?
    };

    check_shape(&doc).finish(())?;

    let mut raw: RawDocument = if doc.is_null() {
        RawDocument::default()
    } else {
        serde_yaml::from_value(doc).map_err(|e| ProvisionError::config("document", e.to_string()))?
    };

    let mut faults = Faults::new();
    let settings = build_settings(raw.settings.take().unwrap_or_default());
    let config = build_config(raw, &mut faults);
    faults.finish(DesiredState { config, settings })
}

fn build_config(raw: RawDocument, faults: &mut Faults) -> ProvisionerConfig {
    let defaults = ProvisionerConfig::default();

    let ring_key = opt(raw.ring_key);
    let ring_key_content = opt(raw.ring_key_content);
    faults.ring_key(ring_key.as_deref(), ring_key_content.as_deref());

    let url = opt(raw.url);
    faults.url("url", url.as_deref());

    let service_manager = match opt(raw.service_type) {
        None => defaults.service_manager,
        Some(s) => ServiceManager::parse(&s).unwrap_or_else(|| {
            faults.push(
                "service_type",
                format!("expected one of [systemd managed unmanaged], got {}", s),
            );
            defaults.service_manager
        }),
    };

    let event_stream = raw.event_stream.map(|es| build_event_stream(es, faults));

    let services = raw
        .services
        .into_iter()
        .enumerate()
        .filter_map(|(i, svc)| build_service(i, svc, faults))
        .collect();

    ProvisionerConfig {
        version: opt(raw.version).unwrap_or_else(|| LATEST.to_string()),
        license: opt(raw.license),
        auto_update: raw.auto_update,
        http_disable: raw.http_disable,
        permanent_peer: raw.permanent_peer,
        listen_ctl: opt(raw.listen_ctl),
        listen_gossip: opt(raw.listen_gossip),
        listen_http: opt(raw.listen_http),
        peers: raw.peers.into_iter().filter(|p| !p.is_empty()).collect(),
        ring_key,
        ring_key_content,
        ctl_secret: opt(raw.ctl_secret),
        skip_install: raw.skip_install,
        use_sudo: raw.use_sudo.unwrap_or(defaults.use_sudo),
        service_manager,
        service_name: opt(raw.service_name).unwrap_or(defaults.service_name),
        url,
        channel: opt(raw.channel),
        events: opt(raw.events),
        organization: opt(raw.organization),
        gateway_auth_token: opt(raw.gateway_auth_token),
        builder_auth_token: opt(raw.builder_auth_token),
        event_stream,
        services,
    }
}

fn build_event_stream(raw: RawEventStream, faults: &mut Faults) -> EventStream {
    let mut meta = HashMap::new();
    for (key, value) in raw.meta {
        match scalar_text(&value) {
            Some(text) => {
                meta.insert(key, text);
            }
            None => faults.push(format!("event_stream.meta.{}", key), "must be a scalar"),
        }
    }

    let es = EventStream {
        application: raw.application.unwrap_or_default(),
        environment: raw.environment.unwrap_or_default(),
        connect_timeout: raw.connect_timeout.unwrap_or_default(),
        meta,
        server_certificate: opt(raw.server_certificate),
        site: opt(raw.site),
        token: raw.token.unwrap_or_default(),
        url: raw.url.unwrap_or_default(),
    };
    faults.event_stream(&es);
    es
}

/// Metadata values are rendered as text, so `port: 80` and `tls: true`
/// are as good as quoted strings.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn build_service(i: usize, raw: RawService, faults: &mut Faults) -> Option<Service> {
    let field = |name: &str| format!("services[{}].{}", i, name);

    let ident = match opt(raw.name) {
        Some(name) => faults.parse(&field("name"), Some(name.as_str())),
        None => {
            faults.push(field("name"), "is required");
            None
        }
    };
    let topology = faults.parse(&field("topology"), opt(raw.topology).as_deref());
    let strategy = faults.parse(&field("strategy"), opt(raw.strategy).as_deref());

    let url = opt(raw.url);
    faults.url(&field("url"), url.as_deref());

    // bind blocks first, then the string tokens
    let mut binds = Vec::new();
    for (j, b) in raw.bind.iter().enumerate() {
        if b.alias.is_empty() || b.service.is_empty() || b.group.is_empty() {
            faults.push(
                format!("services[{}].bind[{}]", i, j),
                "alias, service and group are required",
            );
        } else {
            binds.push(Bind::new(&b.alias, &b.service, &b.group));
        }
    }
    for (j, token) in raw.binds.iter().enumerate() {
        let parsed: Option<Bind> = faults.parse(&format!("services[{}].binds[{}]", i, j), Some(token.as_str()));
        binds.extend(parsed);
    }

    let service_key = opt(raw.service_key);
    faults.key_name(&field("service_key"), service_key.as_deref());

    Some(Service {
        ident: ident?,
        topology,
        strategy,
        user_toml: opt(raw.user_toml),
        channel: opt(raw.channel),
        group: opt(raw.group),
        url,
        binds,
        service_key,
        reload: raw.reload,
        unload: raw.unload,
    })
}

fn build_settings(raw: RawSettings) -> RunSettings {
    let defaults = RunSettings::default();

    let retry = match raw.retry {
        None => defaults.connect.retry.clone(),
        Some(r) => {
            let base = defaults.connect.retry.clone();
            RetryPolicy {
                max_retries: r.max_retries.or(base.max_retries),
                strategy: r.strategy.unwrap_or(base.strategy),
                base_delay_ms: r.base_delay_ms.unwrap_or(base.base_delay_ms),
                max_delay_ms: r.max_delay_ms.unwrap_or(base.max_delay_ms),
            }
        }
    };

    RunSettings {
        connect: ConnectPolicy {
            timeout: raw
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect.timeout),
            retry,
        },
        health: HealthWait {
            interval: raw
                .health_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.health.interval),
            deadline: raw.health_deadline_secs.map(Duration::from_secs),
        },
        cancel: defaults.cancel,
    }
}
