//! Rendered artifacts subject to the checksum gate.
//!
//! A `UnitDescriptor` is created fresh for every convergence attempt: the
//! exact bytes that will be persisted, where they go, where they are staged,
//! and their checksum. The systemd unit layout is load-bearing because it is
//! hashed; identical input must render identical bytes.

use crate::compose::OptionString;
use crate::convergence::Checksum;
use crate::types::ProvisionerConfig;


// ---------------------------------------------------------------------------
// UnitDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescriptor {
    pub contents: Vec<u8>,
    /// Final path on the target.
    pub target_path: String,
    /// Staging path, distinct from `target_path`, when the artifact is
    /// uploaded before being moved into place.
    pub staging_path: Option<String>,
    /// Checksum of exactly `contents`.
    pub checksum: Checksum,
}

impl UnitDescriptor {
    pub fn new(contents: impl Into<Vec<u8>>, target_path: &str, staging_path: Option<&str>) -> Self {
        let contents = contents.into();
        let checksum = Checksum::of(&contents);
        UnitDescriptor {
            contents,
            target_path: target_path.to_string(),
            staging_path: staging_path.map(str::to_string),
            checksum,
        }
    }
}


// ---------------------------------------------------------------------------
// systemd unit
// ---------------------------------------------------------------------------

/// Render the supervisor's systemd unit.
///
/// Secret environment lines are emitted only when non-empty, one per line,
/// in the order gateway token, builder token, license.
pub fn render_systemd_unit(cfg: &ProvisionerConfig, options: &OptionString) -> String {
    let mut unit = String::new();
    unit.push_str("[Unit]\n");
    unit.push_str("Description=Habitat Supervisor\n");
    unit.push('\n');
    unit.push_str("[Service]\n");
    unit.push_str(&format!("ExecStart=/bin/hab sup run{}\n", options));
    unit.push_str("Restart=on-failure\n");

    let secrets = [
        ("HAB_SUP_GATEWAY_AUTH_TOKEN", cfg.gateway_auth_token.as_deref()),
        ("HAB_AUTH_TOKEN", cfg.builder_auth_token.as_deref()),
        ("HAB_LICENSE", cfg.license.as_deref()),
    ];
    for (var, value) in secrets {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            unit.push_str(&format!("Environment=\"{}={}\"\n", var, v));
        }
    }

    unit.push_str("[Install]\n");
    unit.push_str("WantedBy=default.target\n");
    unit
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::supervisor_options;

    const DEFAULT_UNIT: &str = "[Unit]
Description=Habitat Supervisor

[Service]
ExecStart=/bin/hab sup run --peer 1.2.3.4 --auto-update --no-color
Restart=on-failure
[Install]
WantedBy=default.target
";

    fn peer_config() -> ProvisionerConfig {
        ProvisionerConfig {
            version: "0.79.1".into(),
            auto_update: true,
            peers: vec!["1.2.3.4".into()],
            service_name: "hab-sup".into(),
            ..ProvisionerConfig::default()
        }
    }

    #[test]
    fn default_unit_layout() {
        let cfg = peer_config();
        let unit = render_systemd_unit(&cfg, &supervisor_options(&cfg));
        assert_eq!(unit, DEFAULT_UNIT);
    }

    #[test]
    fn secret_lines_in_fixed_order() {
        let cfg = ProvisionerConfig {
            license: Some("accept-no-persist".into()),
            builder_auth_token: Some("dead-beef".into()),
            gateway_auth_token: Some("ea7-beef".into()),
            ..peer_config()
        };
        let unit = render_systemd_unit(&cfg, &supervisor_options(&cfg));
        let env_lines: Vec<&str> = unit
            .lines()
            .filter(|l| l.starts_with("Environment="))
            .collect();
        assert_eq!(
            env_lines,
            vec![
                "Environment=\"HAB_SUP_GATEWAY_AUTH_TOKEN=ea7-beef\"",
                "Environment=\"HAB_AUTH_TOKEN=dead-beef\"",
                "Environment=\"HAB_LICENSE=accept-no-persist\"",
            ]
        );
        assert!(unit.contains("Restart=on-failure\nEnvironment=\"HAB_SUP_GATEWAY"));
        assert!(unit.contains("HAB_LICENSE=accept-no-persist\"\n[Install]\n"));
    }

    #[test]
    fn empty_secrets_are_skipped() {
        let cfg = ProvisionerConfig {
            builder_auth_token: Some(String::new()),
            ..peer_config()
        };
        let unit = render_systemd_unit(&cfg, &supervisor_options(&cfg));
        assert!(!unit.contains("Environment="));
    }

    #[test]
    fn renders_are_byte_identical() {
        let cfg = peer_config();
        let a = UnitDescriptor::new(
            render_systemd_unit(&cfg, &supervisor_options(&cfg)),
            "/etc/systemd/system/hab-sup.service",
            Some("/tmp/hab-sup.service"),
        );
        let b = UnitDescriptor::new(
            render_systemd_unit(&cfg.clone(), &supervisor_options(&cfg.clone())),
            "/etc/systemd/system/hab-sup.service",
            Some("/tmp/hab-sup.service"),
        );
        assert_eq!(a.contents, b.contents);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum, Checksum::of(DEFAULT_UNIT));
    }

    #[test]
    fn option_change_changes_checksum() {
        let cfg = peer_config();
        let other = ProvisionerConfig {
            auto_update: false,
            ..peer_config()
        };
        let a = UnitDescriptor::new(render_systemd_unit(&cfg, &supervisor_options(&cfg)), "/u", None);
        let b = UnitDescriptor::new(render_systemd_unit(&other, &supervisor_options(&other)), "/u", None);
        assert_ne!(a.checksum, b.checksum);
    }
}
