//! Supervisor install and start sequencing.
//!
//! Platform-independent: every remote effect goes through a [`Backend`].

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::compose::{supervisor_options, OptionString};
use crate::convergence::{decide, poll_until, CancelToken, GateDecision, HealthWait};
use crate::error::{ProvisionError, Result};
use crate::infrastructure::Remote;
use crate::types::{ProvisionerConfig, ServiceManager};

/// What converging the supervisor did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorReport {
    /// The composed launch options, as rendered into the artifact.
    pub options: String,
    /// `None` for the unmanaged mode, which has no gate.
    pub decision: Option<GateDecision>,
    /// Status probes made while waiting for the restarted supervisor.
    pub health_checks: u32,
}

/// Fetch and run the installer, then make sure the execution account
/// exists. The account probe failing is how "absent" is reported.
pub fn install_supervisor(backend: &dyn Backend, cfg: &ProvisionerConfig, remote: &mut Remote<'_>) -> Result<()> {
    backend.fetch_installer(remote)?;
    backend.run_installer(remote, cfg.pinned_version())?;
    backend.prepare_account(remote)?;
    if !backend.account_exists(remote) {
        backend.create_account(remote)?;
    }
    backend.finish_install(remote)
}

/// Bring the supervisor to the configured launch options, restarting it
/// only when the persisted artifact differs from the freshly rendered one.
pub fn converge_supervisor(
    backend: &dyn Backend,
    cfg: &ProvisionerConfig,
    remote: &mut Remote<'_>,
    health: &HealthWait,
    cancel: &CancelToken,
) -> Result<SupervisorReport> {
    backend.install_supervisor_package(remote, cfg.pinned_version())?;
    let options = supervisor_options(cfg);

    match cfg.service_manager {
        ServiceManager::Unmanaged => {
            // no duplicate detection; every run launches another process
            backend.launch_unmanaged(remote, cfg, &options)?;
            Ok(report(&options, None, 0))
        }
        ServiceManager::Managed => {
            let unit = backend.supervisor_artifact(cfg, &options);
            backend.stage_artifact(remote, &unit)?;
            let persisted = backend.persisted_checksum(remote, &unit);
            let decision = decide(&persisted, &unit.checksum);
            tracing::info!(
                persisted = %persisted,
                rendered = %unit.checksum,
                ?decision,
                "supervisor artifact {}",
                unit.target_path
            );

            let mut health_checks = 0;
            match decision {
                GateDecision::Restart => {
                    backend.activate_artifact(remote, &unit)?;
                    let status = backend.supervisor_status_command();
                    health_checks = poll_until(health, cancel, || {
                        remote
                            .probe_output(&status)
                            .is_some_and(|out| !out.trim().is_empty())
                    })
                    .map_err(|source| ProvisionError::HealthWait {
                        service: cfg.service_name.clone(),
                        source,
                    })?;
                }
                GateDecision::Unchanged => backend.discard_staged(remote, &unit),
            }

            backend.enable_supervisor(remote)?;
            Ok(report(&options, Some(decision), health_checks))
        }
    }
}

fn report(options: &OptionString, decision: Option<GateDecision>, health_checks: u32) -> SupervisorReport {
    SupervisorReport {
        options: options.to_string(),
        decision,
        health_checks,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::{LinuxBackend, WindowsBackend};
    use crate::convergence::Checksum;
    use crate::error::WaitError;
    use crate::infrastructure::{MemorySink, MockSession};

    fn peer_config() -> ProvisionerConfig {
        ProvisionerConfig {
            version: "0.79.1".into(),
            auto_update: true,
            peers: vec!["1.2.3.4".into()],
            service_manager: ServiceManager::Managed,
            service_name: "hab-sup".into(),
            ..ProvisionerConfig::default()
        }
    }

    fn fast() -> HealthWait {
        HealthWait {
            interval: Duration::from_millis(1),
            deadline: Some(Duration::from_secs(5)),
        }
    }

    fn converge(cfg: &ProvisionerConfig, session: &mut MockSession) -> Result<SupervisorReport> {
        let backend = LinuxBackend::new(cfg);
        let sink = MemorySink::new();
        let mut remote = Remote::new(session, &sink);
        converge_supervisor(&backend, cfg, &mut remote, &fast(), &CancelToken::new())
    }

    #[test]
    fn install_creates_account_only_when_probe_fails() {
        let cfg = peer_config();
        let backend = LinuxBackend::new(&cfg);
        let sink = MemorySink::new();

        let mut fresh = MockSession::new();
        fresh.fail_when("id hab");
        install_supervisor(&backend, &cfg, &mut Remote::new(&mut fresh, &sink)).unwrap();
        assert!(fresh.ran("adduser -D -g \"\" hab"));
        assert!(fresh.ran("bash ./install.sh -v 0.79.1"));
        let busybox = fresh.position("hab pkg install core/busybox").unwrap();
        assert!(busybox > fresh.position("bash ./install.sh").unwrap());
        assert!(busybox < fresh.position("id hab").unwrap());
        assert!(fresh.position("rm -f install.sh") > fresh.position("adduser"));

        let mut existing = MockSession::new();
        install_supervisor(&backend, &cfg, &mut Remote::new(&mut existing, &sink)).unwrap();
        assert!(existing.ran("hab pkg install core/busybox"));
        assert!(!existing.ran("adduser"));
    }

    #[test]
    fn busybox_install_failure_is_fatal() {
        let cfg = peer_config();
        let backend = LinuxBackend::new(&cfg);
        let sink = MemorySink::new();
        let mut session = MockSession::new();
        session.fail_when("hab pkg install core/busybox");
        let err = install_supervisor(&backend, &cfg, &mut Remote::new(&mut session, &sink)).unwrap_err();
        assert!(matches!(err, ProvisionError::Command { .. }));
        assert!(!session.ran("id hab"));
        assert!(!session.ran("rm -f install.sh"));
    }

    #[test]
    fn install_failure_is_fatal() {
        let cfg = peer_config();
        let backend = LinuxBackend::new(&cfg);
        let sink = MemorySink::new();
        let mut session = MockSession::new();
        session.fail_when("install.sh -v");
        let err = install_supervisor(&backend, &cfg, &mut Remote::new(&mut session, &sink)).unwrap_err();
        assert!(matches!(err, ProvisionError::Command { .. }));
        assert!(!session.ran("core/busybox"));
    }

    #[test]
    fn first_run_restarts_then_enables() {
        let cfg = peer_config();
        let mut session = MockSession::new();
        session.fail_when("sha256sum");
        session.respond_when("hab svc status", "package  type  desired  state\n");
        let report = converge(&cfg, &mut session).unwrap();

        assert_eq!(report.options, " --peer 1.2.3.4 --auto-update --no-color");
        assert_eq!(report.decision, Some(GateDecision::Restart));
        assert_eq!(report.health_checks, 1);

        let unit = session.uploaded("/tmp/hab-sup.service").unwrap();
        let unit = String::from_utf8_lossy(unit);
        assert!(unit.contains("ExecStart=/bin/hab sup run --peer 1.2.3.4 --auto-update --no-color\n"));

        let restart = session
            .position("mv /tmp/hab-sup.service /etc/systemd/system/hab-sup.service && systemctl daemon-reload && systemctl restart hab-sup")
            .unwrap();
        let enable = session.position("systemctl enable hab-sup").unwrap();
        assert!(restart < enable);
        assert!(session.ran("hab pkg install core/hab-sup/0.79.1"));
    }

    #[test]
    fn matching_checksum_skips_restart_but_enables() {
        let cfg = peer_config();
        let backend = LinuxBackend::new(&cfg);
        let unit = backend.supervisor_artifact(&cfg, &supervisor_options(&cfg));
        let mut session = MockSession::new();
        session.respond_when(
            "sha256sum",
            &format!("{}  /etc/systemd/system/hab-sup.service\n", unit.checksum.to_hex()),
        );
        let report = converge(&cfg, &mut session).unwrap();

        assert_eq!(report.decision, Some(GateDecision::Unchanged));
        assert_eq!(report.health_checks, 0);
        assert!(!session.ran("daemon-reload"));
        assert!(!session.ran("systemctl restart"));
        assert!(!session.ran("mv /tmp/hab-sup.service"));
        assert!(session.ran("rm -f /tmp/hab-sup.service"));
        assert!(session.ran("systemctl enable hab-sup"));
    }

    #[test]
    fn stale_checksum_restarts() {
        let cfg = peer_config();
        let mut session = MockSession::new();
        session.respond_when(
            "sha256sum",
            &format!("{}  /etc/systemd/system/hab-sup.service\n", Checksum::of("old unit").to_hex()),
        );
        session.respond_when("hab svc status", "up\n");
        let report = converge(&cfg, &mut session).unwrap();
        assert_eq!(report.decision, Some(GateDecision::Restart));
        assert!(session.ran("systemctl restart hab-sup"));
    }

    #[test]
    fn health_wait_deadline_surfaces() {
        let cfg = peer_config();
        let backend = LinuxBackend::new(&cfg);
        let mut session = MockSession::new();
        session.fail_when("sha256sum");
        let sink = MemorySink::new();
        let mut remote = Remote::new(&mut session, &sink);
        let health = HealthWait {
            interval: Duration::from_millis(1),
            deadline: Some(Duration::from_millis(10)),
        };
        let err = converge_supervisor(&backend, &cfg, &mut remote, &health, &CancelToken::new()).unwrap_err();
        match err {
            ProvisionError::HealthWait { service, source } => {
                assert_eq!(service, "hab-sup");
                assert!(matches!(source, WaitError::DeadlineExceeded { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(remote);
        assert!(!session.ran("systemctl enable"));
    }

    #[test]
    fn unmanaged_always_launches() {
        let cfg = ProvisionerConfig {
            service_manager: ServiceManager::Unmanaged,
            ..peer_config()
        };
        let mut session = MockSession::new();
        converge(&cfg, &mut session).unwrap();
        converge(&cfg, &mut session).unwrap();
        assert_eq!(session.count("setsid hab sup run"), 2);
        assert!(!session.ran("systemctl"));
    }

    #[test]
    fn windows_restart_path() {
        let cfg = peer_config();
        let backend = WindowsBackend::new(&cfg);
        let mut session = MockSession::new();
        session.respond_when("hab svc status", "up\n");
        let sink = MemorySink::new();
        let mut remote = Remote::new(&mut session, &sink);
        let report = converge_supervisor(&backend, &cfg, &mut remote, &fast(), &CancelToken::new()).unwrap();
        drop(remote);
        assert_eq!(report.decision, Some(GateDecision::Restart));
        assert!(session.ran("Restart-Service Habitat"));
        assert!(session.ran("Set-Service -Name Habitat -StartupType Automatic"));
        assert!(session.uploads.is_empty());
    }
}
