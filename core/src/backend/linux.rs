//! Linux backend: bash command templates, systemd unit management, and
//! stage-then-move uploads under sudo.

use crate::artifact::{render_systemd_unit, UnitDescriptor};
use crate::compose::OptionString;
use crate::convergence::Checksum;
use crate::error::Result;
use crate::infrastructure::Remote;
use crate::types::{ProvisionerConfig, Service};

use super::{Backend, CommandEnv, Platform};

const INSTALL_SH_URL: &str =
    "https://raw.githubusercontent.com/habitat-sh/habitat/master/components/hab/install.sh";
const SUP_DIR: &str = "/hab/sup/default";
const KEYS_DIR: &str = "/hab/cache/keys";

pub struct LinuxBackend {
    env: CommandEnv,
    use_sudo: bool,
    service_name: String,
}

impl LinuxBackend {
    pub fn new(cfg: &ProvisionerConfig) -> Self {
        LinuxBackend {
            env: CommandEnv::from_config(cfg),
            use_sudo: cfg.use_sudo,
            service_name: cfg.service_name.clone(),
        }
    }

    fn unit_target(&self) -> String {
        format!("/etc/systemd/system/{}.service", self.service_name)
    }

    fn unit_staging(&self) -> String {
        format!("/tmp/{}.service", self.service_name)
    }

    /// Upload to `dest`, staging through `staging` and moving into place
    /// when running under sudo.
    fn place(&self, remote: &mut Remote<'_>, staging: &str, dest: &str, contents: &[u8]) -> Result<()> {
        if self.use_sudo {
            remote.upload(staging, contents)?;
            self.run(remote, &format!("mv {} {}", staging, dest))?;
            Ok(())
        } else {
            remote.upload(dest, contents)
        }
    }
}

/// Escape `'` for embedding in a single-quoted bash word.
fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "'\\''")
}

impl Backend for LinuxBackend {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn command(&self, inner: &str) -> String {
        let mut env = String::from("env HAB_NONINTERACTIVE=true HAB_NOCOLORING=true");
        if let Some(ref license) = self.env.license {
            env.push_str(&format!(" HAB_LICENSE={}", license));
        }
        if let Some(ref token) = self.env.auth_token {
            env.push_str(&format!(" HAB_AUTH_TOKEN={}", token));
        }
        let sudo = if self.use_sudo { " sudo -E" } else { "" };
        format!("{}{} /bin/bash -c '{}'", env, sudo, escape_single_quotes(inner))
    }

    fn fetch_installer(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, &format!("curl --silent -L0 {} > install.sh", INSTALL_SH_URL))?;
        Ok(())
    }

    fn run_installer(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()> {
        let cmd = match pinned {
            Some(v) => format!("bash ./install.sh -v {}", v),
            None => "bash ./install.sh".to_string(),
        };
        self.run(remote, &cmd)?;
        Ok(())
    }

    fn prepare_account(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, "hab pkg install core/busybox")?;
        Ok(())
    }

    fn account_exists(&self, remote: &mut Remote<'_>) -> bool {
        self.probe(remote, "hab pkg exec core/busybox id hab")
    }

    fn create_account(&self, remote: &mut Remote<'_>) -> Result<()> {
        tracing::info!("No existing hab user detected, creating...");
        self.run(remote, "hab pkg exec core/busybox adduser -D -g \"\" hab")?;
        Ok(())
    }

    fn finish_install(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, "rm -f install.sh")?;
        Ok(())
    }

    fn upload_ring_key(&self, remote: &mut Remote<'_>, content: &str) -> Result<()> {
        self.run(remote, &format!("echo -e \"{}\" | hab ring key import", content))?;
        Ok(())
    }

    fn upload_ctl_secret(&self, remote: &mut Remote<'_>, secret: &str) -> Result<()> {
        let dest = format!("{}/CTL_SECRET", SUP_DIR);
        self.run(remote, &format!("mkdir -p {}", SUP_DIR))?;
        if self.use_sudo {
            let staging = "/tmp/CTL_SECRET";
            remote.upload(staging, secret.as_bytes())?;
            self.run(
                remote,
                &format!("mv {} {} && chown root:root {} && chmod 0600 {}", staging, dest, dest, dest),
            )?;
            Ok(())
        } else {
            remote.upload(&dest, secret.as_bytes())
        }
    }

    fn install_supervisor_package(&self, remote: &mut Remote<'_>, pinned: Option<&str>) -> Result<()> {
        let cmd = match pinned {
            Some(v) => format!("hab pkg install core/hab-sup/{}", v),
            None => "hab pkg install core/hab-sup".to_string(),
        };
        self.run(remote, &cmd)?;
        Ok(())
    }

    fn supervisor_artifact(&self, cfg: &ProvisionerConfig, options: &OptionString) -> UnitDescriptor {
        UnitDescriptor::new(
            render_systemd_unit(cfg, options),
            &self.unit_target(),
            Some(&self.unit_staging()),
        )
    }

    fn stage_artifact(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Result<()> {
        let path = unit.staging_path.as_deref().unwrap_or(&unit.target_path);
        remote.upload(path, &unit.contents)
    }

    fn persisted_checksum(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Checksum {
        let target = &unit.target_path;
        let out = remote.probe_output(&self.command(&format!("test -f {} && sha256sum {}", target, target)));
        Checksum::from_probe(out.as_deref())
    }

    fn activate_artifact(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) -> Result<()> {
        let restart = format!(
            "systemctl daemon-reload && systemctl restart {}",
            self.service_name
        );
        let cmd = match unit.staging_path {
            Some(ref staging) => format!("mv {} {} && {}", staging, unit.target_path, restart),
            None => restart,
        };
        self.run(remote, &cmd)?;
        Ok(())
    }

    fn discard_staged(&self, remote: &mut Remote<'_>, unit: &UnitDescriptor) {
        if let Some(ref staging) = unit.staging_path {
            remote.best_effort(&self.command(&format!("rm -f {}", staging)));
        }
    }

    fn supervisor_status_command(&self) -> String {
        self.command("hab svc status 2>/dev/null")
    }

    fn enable_supervisor(&self, remote: &mut Remote<'_>) -> Result<()> {
        self.run(remote, &format!("systemctl enable {}", self.service_name))?;
        Ok(())
    }

    fn launch_unmanaged(&self, remote: &mut Remote<'_>, cfg: &ProvisionerConfig, options: &OptionString) -> Result<()> {
        self.run(remote, &format!("mkdir -p {} && chmod o+w {}", SUP_DIR, SUP_DIR))?;

        let mut assignments = Vec::new();
        if let Some(token) = cfg.builder_auth_token.as_deref().filter(|t| !t.is_empty()) {
            assignments.push(format!("HAB_AUTH_TOKEN={}", token));
        }
        if let Some(license) = cfg.license.as_deref().filter(|l| !l.is_empty()) {
            assignments.push(format!("HAB_LICENSE={}", license));
        }
        let env = if assignments.is_empty() {
            String::new()
        } else {
            format!("env {} ", assignments.join(" "))
        };
        self.run(
            remote,
            &format!(
                "({}setsid hab sup run{} > {}/sup.log 2>&1 <&1 &) ; sleep 1",
                env, options, SUP_DIR
            ),
        )?;
        Ok(())
    }

    fn install_package(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()> {
        self.run(remote, &format!("hab pkg install {}{}", service.ident, options))?;
        Ok(())
    }

    fn place_user_config(&self, remote: &mut Remote<'_>, service: &Service, content: &str) -> Result<()> {
        tracing::info!("Uploading user.toml for service: {}", service.ident);
        let dir = format!("/hab/user/{}/config", service.package_name());
        self.run(remote, &format!("mkdir -p {}", dir))?;
        let staging = format!("/tmp/user-{}.toml", service.ident_checksum());
        self.place(remote, &staging, &format!("{}/user.toml", dir), content.as_bytes())
    }

    fn place_service_key(&self, remote: &mut Remote<'_>, key_name: &str, content: &str) -> Result<()> {
        tracing::info!("Uploading service group key: {}", key_name);
        let file = format!("{}.box.key", key_name);
        self.place(
            remote,
            &format!("/tmp/{}", file),
            &format!("{}/{}", KEYS_DIR, file),
            content.as_bytes(),
        )
    }

    fn service_loaded(&self, remote: &mut Remote<'_>, service: &Service) -> bool {
        self.probe(remote, &format!("hab svc status {} >/dev/null 2>&1", service.ident))
    }

    fn load_service(&self, remote: &mut Remote<'_>, service: &Service, options: &OptionString) -> Result<()> {
        self.run(remote, &format!("hab svc load {}{}", service.ident, options))?;
        Ok(())
    }

    fn unload_service(&self, remote: &mut Remote<'_>, service: &Service) {
        remote.best_effort(&self.command(&format!(
            "hab svc unload {} > /dev/null 2>&1 ; sleep 3",
            service.ident
        )));
    }
}
