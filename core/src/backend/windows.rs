//! Windows backend: PowerShell command templates and the Habitat Windows
//! service.
//!
//! The managed supervisor runs as the `Habitat` Windows service; its launch
//! arguments live in `HabService.dll.config`. That argument string is the
//! artifact guarded by the checksum gate: it is read back, hashed here, and
//! only rewritten (followed by a service restart) when it differs.

use crate::artifact::UnitDescriptor;
use crate::compose::OptionString;
use crate::convergence::Checksum;
use crate::error::{ProvisionError, Result};
use crate::infrastructure::Remote;
use crate::types::{ProvisionerConfig, Service};

use super::{Backend, CommandEnv, Platform};

const INSTALL_PS1_URL: &str =
    "https://raw.githubusercontent.com/habitat-sh/habitat/master/components/hab/install.ps1";
const INSTALL_PS1_PATH: &str = "C:\\Windows\\TEMP\\install.ps1";
const SERVICE_CONFIG_PATH: &str = "C:\\hab\\svc\\windows-service\\HabService.dll.config";
const SUP_DIR: &str = "C:\\hab\\sup\\default";
const KEYS_DIR: &str = "C:\\hab\\cache\\keys";

const LOAD_CONFIG: &str = "$svcPath = Join-Path $env:SystemDrive \\\"hab\\svc\\windows-service\\\"; \
                           [xml]$configXml = Get-Content (Join-Path $svcPath HabService.dll.config);";
const LAUNCH_ARGS: &str = "$configXml.configuration.appSettings.ChildNodes[\\\"2\\\"].value";

pub struct WindowsBackend {
    env: CommandEnv,
    gateway_auth_token: Option<String>,
}

impl WindowsBackend {
    pub fn new(cfg: &ProvisionerConfig) -> Self {
        WindowsBackend {
            env: CommandEnv::from_config(cfg),
            gateway_auth_token: cfg
                .gateway_auth_token
                .clone()
                .filter(|t| !t.is_empty()),
        }
    }

    /// Persist an environment variable at Machine, Process and User scope.
    fn set_env_everywhere(&self, remote: &mut Remote<'_>, name: &str, value: &str) -> Result<()> {
        for scope in ["Machine", "Process", "User"] {
            self.run(
                remote,
                &format!(
                    "[System.Environment]::SetEnvironmentVariable(\\\"{}\\\", \\\"{}\\\", [System.EnvironmentVariableTarget]::{})",
                    name, value, scope
                ),
            )?;
        }
        Ok(())
    }

    fn ensure_dir(&self, remote: &mut Remote<'_>, dir: &str) -> Result<()> {
        self.run(
            remote,
            &format!("New-Item -ItemType Directory -Force -Path {} | Out-Null", dir),
        )?;
        Ok(())
    }
}

impl Backend for WindowsBackend {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn command(&self, inner: &str) -> String {
        let mut env = String::from("$Env:HAB_NONINTERACTIVE=\\\"true\\\"; $Env:HAB_NOCOLORING=\\\"true\\\"; ");
        if let Some(ref license) = self.env.license {
            env.push_str(&format!("$Env:HAB_LICENSE=\\\"{}\\\"; ", license));
        }
        if let Some(ref token) = self.env.auth_token {
            env.push_str(&format!("$Env:HAB_AUTH_TOKEN=\\\"{}\\\"; ", token));
        }
        format!(
            "powershell.exe -NoProfile -ExecutionPolicy Bypass -Command \"{}{}\"",
            env, inner
        )
    }

    fn fetch_installer(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(
            remote,
            "[Net.ServicePointManager]::SecurityProtocol = [Net.SecurityProtocolType]::Tls12",
        )?;
        if let Some(ref license) = self.env.license {
            self.set_env_everywhere(remote, "HAB_LICENSE", license)?;
        }
        self.run(remote, &format!("irm {} > {}", INSTALL_PS1_URL, INSTALL_PS1_PATH))?;
        Ok(())
    }

    fn run_installer(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()> {
        let version = pinned.unwrap_or(crate::types::config::LATEST);
        remote.run(&format!(
            "powershell.exe -NoProfile -ExecutionPolicy Bypass -File \"{}\" -Version {}",
            INSTALL_PS1_PATH, version
        ))?;
        Ok(())
    }

    /// The service package installs the account it runs under.
    fn account_exists(&self, _remote: &mut Remote<'_>) -> bool {
        true
    }

    fn create_account(&self, _remote: &mut Remote<'_>) -> Result<()> {
        Ok(())
    }

    fn finish_install(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, "hab pkg install core/windows-service")?;
        self.run(
            remote,
            "New-NetFirewallRule -DisplayName \\\"Habitat TCP\\\" -Direction Inbound -Action Allow -Protocol TCP -LocalPort 9631,9638",
        )?;
        self.run(
            remote,
            "New-NetFirewallRule -DisplayName \\\"Habitat UDP\\\" -Direction Inbound -Action Allow -Protocol UDP -LocalPort 9638",
        )?;
        if let Some(ref token) = self.gateway_auth_token {
            self.set_env_everywhere(remote, "HAB_SUP_GATEWAY_AUTH_TOKEN", token)?;
        }
        Ok(())
    }

    fn upload_ring_key(&self, remote: &mut Remote<'_>, content: &str) -> Result<()> {
        let escaped = content.replace('\n', "`n");
        remote.run(&format!("powershell.exe -Command echo {} | hab ring key import", escaped))?;
        Ok(())
    }

    fn upload_ctl_secret(&self, remote: &mut Remote<'_>, secret: &str) -> Result<()> {
        self.ensure_dir(remote, SUP_DIR)?;
        remote.upload(&format!("{}\\CTL_SECRET", SUP_DIR), secret.as_bytes())
    }

    fn install_supervisor_package(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()> {
        let cmd = match pinned {
            Some(v) => format!("hab pkg install core/hab-sup/{}", v),
            None => "hab pkg install core/hab-sup".to_string(),
        };
        self.run(remote, &cmd)?;
        Ok(())
    }

    fn supervisor_artifact(&self, _cfg: &ProvisionerConfig, options: &OptionString) -> UnitDescriptor {
        UnitDescriptor::new(options.to_string(), SERVICE_CONFIG_PATH, None)
    }

    fn stage_artifact(&self, _remote: &mut Remote<'_>, _unit: &UnitDescriptor) -> Result<()> {
        Ok(())
    }

    fn persisted_checksum(&self, remote: &mut Remote<'_>, _unit: &UnitDescriptor) -> Checksum {
        let out = remote.probe_output(&self.command(&format!("{} {}", LOAD_CONFIG, LAUNCH_ARGS)));
        match out.as_deref().map(|o| o.trim_end_matches(['\r', '\n'])) {
            Some(value) if !value.is_empty() => Checksum::of(value),
            _ => Checksum::Absent,
        }
    }

    fn activate_artifact(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Result<()> {
        let value = String::from_utf8_lossy(&unit.contents);
        self.run(
            remote,
            &format!(
                "{} {} = '{}'; $configXml.Save((Join-Path $svcPath HabService.dll.config));",
                LOAD_CONFIG, LAUNCH_ARGS, value
            ),
        )?;
        self.run(remote, "Restart-Service Habitat")?;
        Ok(())
    }

    fn discard_staged(&self, _remote: &mut Remote<'_>, _unit: &UnitDescriptor) {}

    fn supervisor_status_command(&self) -> String {
        self.command("hab svc status")
    }

    fn enable_supervisor(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, "Set-Service -Name Habitat -StartupType Automatic")?;
        Ok(())
    }

    fn launch_unmanaged(&self, _remote: &mut Remote<'_>, _cfg: &ProvisionerConfig, _options: &OptionString) -> Result<()> {
        Err(ProvisionError::unsupported(
            "unmanaged supervisor is not available on windows",
        ))
    }

    fn install_package(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()> {
        self.run(remote, &format!("hab pkg install {}{}", service.ident, options))?;
        Ok(())
    }

    fn place_user_config(&self, remote: &mut Remote<'_>, service: &Service, content: &str) -> Result<()> {
        tracing::info!("Uploading user.toml for service: {}", service.ident);
        let dir = format!("C:\\hab\\user\\{}\\config", service.package_name());
        self.ensure_dir(remote, &dir)?;
        remote.upload(&format!("{}\\user.toml", dir), content.as_bytes())
    }

    fn place_service_key(&self, remote: &mut Remote<'_>, key_name: &str, content: &str) -> Result<()> {
        tracing::info!("Uploading service group key: {}", key_name);
        remote.upload(&format!("{}\\{}.box.key", KEYS_DIR, key_name), content.as_bytes())
    }

    fn service_loaded(&self, remote: &mut Remote<'_>, service: &Service) -> bool {
        self.probe(remote, &format!("hab svc status {} 2>&1 | out-null", service.ident))
    }

    fn load_service(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()> {
        self.run(remote, &format!("hab svc load {}{}", service.ident, options))?;
        Ok(())
    }

    fn unload_service(&self, remote: &mut Remote<'_>, service: &Service) {
        remote.best_effort(&self.command(&format!(
            "hab svc unload {} 2>&1 | out-null ; start-sleep -s 3",
            service.ident
        )));
    }
}
