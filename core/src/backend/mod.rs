//! OS command-dispatch backends.
//!
//! A `Backend` supplies the leaf command templates and path conventions for
//! one target OS. Sequencing lives elsewhere (`supervisor`, `loader`,
//! `orchestrator`) and is shared by both implementations; only the strings
//! sent through the session differ.

pub mod linux;
pub mod windows;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use linux::LinuxBackend;
pub use windows::WindowsBackend;

use crate::artifact::UnitDescriptor;
use crate::compose::OptionString;
use crate::convergence::Checksum;
use crate::error::{ProvisionError, Result};
use crate::infrastructure::Remote;
use crate::types::{ProvisionerConfig, Service};


// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    /// Map a connection/platform descriptor to a backend variant.
    /// An empty descriptor means the default SSH/Linux pairing.
    pub fn resolve(descriptor: &str) -> Result<Platform> {
        match descriptor.trim().to_ascii_lowercase().as_str() {
            "" | "ssh" | "linux" => Ok(Platform::Linux),
            "winrm" | "windows" => Ok(Platform::Windows),
            other => Err(ProvisionError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}


// ---------------------------------------------------------------------------
// CommandEnv
// ---------------------------------------------------------------------------

/// Environment carried into every wrapped command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandEnv {
    pub license: Option<String>,
    pub auth_token: Option<String>,
}

impl CommandEnv {
    pub fn from_config(cfg: &ProvisionerConfig) -> Self {
        CommandEnv {
            license: non_empty(cfg.license.as_deref()),
            auth_token: non_empty(cfg.builder_auth_token.as_deref()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Build the backend for `platform`. Constructed per run; nothing is
/// registered globally.
pub fn backend_for(platform: Platform, cfg: &ProvisionerConfig) -> Box<dyn Backend> {
    match platform {
        Platform::Linux => Box::new(LinuxBackend::new(cfg)),
        Platform::Windows => Box::new(WindowsBackend::new(cfg)),
    }
}


// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The capability set every target OS implements.
pub trait Backend {
    fn platform(&self) -> Platform;

    /// Wrap `inner` with the environment prelude (and privilege escalation
    /// where applicable).
    fn command(&self, inner: &str) -> String;

    fn run(&self, remote: &mut Remote<'_>, inner: &str) -> Result<String> {
        remote.run(&self.command(inner))
    }

    fn probe(&self, remote: &mut Remote<'_>, inner: &str) -> bool {
        remote.probe(&self.command(inner))
    }

    // -- supervisor install --

    fn fetch_installer(&self, remote: &mut Remote<'_>) -> Result<()>;

    /// `pinned` is `None` for the latest release.
    fn run_installer(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()>;

    /// Fatal setup the account probe depends on.
    fn prepare_account(&self, _remote: &mut Remote<'_>) -> Result<()> {
        Ok(())
    }

    /// Best-effort probe for the supervisor's execution account.
    fn account_exists(&self, remote: &mut Remote<'_>) -> bool;

    fn create_account(&self, remote: &mut Remote<'_>) -> Result<()>;

    /// Post-install steps (cleanup, OS integration).
    fn finish_install(&self, remote: &mut Remote<'_>) -> Result<()>;

    // -- secrets --

    fn upload_ring_key(&self, remote: &mut Remote<'_>, content: &str) -> Result<()>;

    fn upload_ctl_secret(&self, remote: &mut Remote<'_>, secret: &str) -> Result<()>;

    // -- supervisor start --

    fn install_supervisor_package(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()>;

    /// Render the artifact whose checksum gates a supervisor restart.
    fn supervisor_artifact(&self, cfg: &ProvisionerConfig, options: &OptionString) -> UnitDescriptor;

    /// Upload the artifact to its staging location, if it has one.
    fn stage_artifact(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Result<()>;

    /// Checksum of what is currently persisted at the final location.
    /// Anything unreadable is `Checksum::Absent`.
    fn persisted_checksum(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Checksum;

    /// Move the artifact into place and restart the supervisor.
    fn activate_artifact(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Result<()>;

    /// Drop a staged copy that turned out to be unnecessary.
    fn discard_staged(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor);

    /// Command whose non-empty output means the supervisor is up.
    fn supervisor_status_command(&self) -> String;

    fn enable_supervisor(&self, remote: &mut Remote<'_>) -> Result<()>;

    /// Launch a detached supervisor outside the service manager.
    fn launch_unmanaged(&self, remote: &mut Remote<'_>, cfg: &ProvisionerConfig, options: &OptionString) -> Result<()>;

    // -- services --

    fn install_package(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()>;

    fn place_user_config(&self, remote: &mut Remote<'_>, service: &Service, content: &str) -> Result<()>;

    fn place_service_key(&self, remote: &mut Remote<'_>, key_name: &str, content: &str) -> Result<()>;

    /// Best-effort probe; a failing status command means "not loaded".
    fn service_loaded(&self, remote: &mut Remote<'_>, service: &Service) -> bool;

    fn load_service(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()>;

    /// Best-effort; failures are swallowed.
    fn unload_service(&self, remote: &mut Remote<'_>, service: &Service);
}
