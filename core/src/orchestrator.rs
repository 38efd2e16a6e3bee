//! Convergence orchestrator.
//!
//! Runs the fixed sequence against one target host:
//!
//! 1. resolve the backend for the platform descriptor
//! 2. connect with retry
//! 3. install the supervisor (unless skipped)
//! 4. import the ring key, if any
//! 5. place the control secret, if any
//! 6. converge the supervisor
//! 7. converge every service
//!
//! The configuration is validated before the connect, so an invalid
//! record never reaches the host.
//!
//! Steps 1-6 stop at the first failure. Step 7 attempts every service and
//! reports all failures together once the loop is done.

use serde::{Deserialize, Serialize};

use crate::backend::{backend_for, Backend, Platform};
use crate::convergence::{CancelToken, HealthWait};
use crate::error::{ProvisionError, Result, ServiceFailure};
use crate::infrastructure::{connect_with_retry, ConnectPolicy, ConnectionInfo, OutputSink, Remote, Session};
use crate::loader::{converge_service, LoadOutcome};
use crate::supervisor::{converge_supervisor, install_supervisor, SupervisorReport};
use crate::types::ProvisionerConfig;


// ---------------------------------------------------------------------------
// RunSettings
// ---------------------------------------------------------------------------

/// Per-run knobs. Constructed by the caller and threaded through the run;
/// nothing here is process-global.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub connect: ConnectPolicy,
    pub health: HealthWait,
    /// Cancelling this aborts connect retries and the health wait.
    pub cancel: CancelToken,
}


// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub ident: String,
    pub outcome: LoadOutcome,
}

/// Everything a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub platform: Platform,
    pub connection: ConnectionInfo,
    pub supervisor: SupervisorReport,
    pub services: Vec<ServiceReport>,
}


// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

pub struct Provisioner {
    config: ProvisionerConfig,
    settings: RunSettings,
}

impl Provisioner {
    pub fn new(config: ProvisionerConfig, settings: RunSettings) -> Self {
        Provisioner { config, settings }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Converge the host behind `session`.
    pub fn run(&self, platform: &str, session: &mut dyn Session, sink: &dyn OutputSink) -> Result<RunReport> {
        let platform = Platform::resolve(platform)?;
        self.config.validate()?;
        let backend = backend_for(platform, &self.config);

        let connection = connect_with_retry(session, &self.settings.connect, &self.settings.cancel)?;
        let result = {
            let mut remote = Remote::new(session, sink);
            self.converge(backend.as_ref(), &mut remote)
        };
        session.disconnect();

        let (supervisor, services) = result?;
        Ok(RunReport {
            platform,
            connection,
            supervisor,
            services,
        })
    }

    fn converge(&self, backend: &dyn Backend, remote: &mut Remote<'_>) -> Result<(SupervisorReport, Vec<ServiceReport>)> {
        let cfg = &self.config;

        if cfg.skip_install {
            tracing::info!("Skipping habitat installation");
        } else {
            tracing::info!("Installing habitat...");
            install_supervisor(backend, cfg, remote)?;
        }

        if let Some(content) = cfg.ring_key_content.as_deref().filter(|c| !c.is_empty()) {
            tracing::info!("Uploading supervisor ring key...");
            backend.upload_ring_key(remote, content)?;
        }

        if let Some(secret) = cfg.ctl_secret.as_deref().filter(|s| !s.is_empty()) {
            tracing::info!("Uploading ctl secret...");
            backend.upload_ctl_secret(remote, secret)?;
        }

        tracing::info!("Starting habitat supervisor...");
        let supervisor = converge_supervisor(backend, cfg, remote, &self.settings.health, &self.settings.cancel)?;

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for service in &cfg.services {
            let ident = service.ident.to_string();
            tracing::info!("Starting service: {}", ident);
            match converge_service(backend, service, remote) {
                Ok(outcome) => reports.push(ServiceReport { ident, outcome }),
                Err(error) => {
                    tracing::warn!(service = %ident, error = %error, "service failed to converge");
                    failures.push(ServiceFailure { service: ident, error });
                }
            }
        }

        if failures.is_empty() {
            Ok((supervisor, reports))
        } else {
            Err(ProvisionError::Convergence {
                failures,
                converged: reports.into_iter().map(|r| r.ident).collect(),
            })
        }
    }
}
