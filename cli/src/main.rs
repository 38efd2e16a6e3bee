//! habp: converge a Habitat supervisor and its services on a remote host.
//!
//! # Usage
//!
//! ```text
//! habp validate site.yaml
//! habp render site.yaml
//! habp apply site.yaml --host 10.0.0.5 --user ubuntu --identity ~/.ssh/id_ed25519
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hab_provision_core::artifact::render_systemd_unit;
use hab_provision_core::compose::supervisor_options;
use hab_provision_core::data::{self, DesiredState};
use hab_provision_core::{Provisioner, ProvisionError, SshSession, SshTarget, TracingSink};


#[derive(Parser)]
#[command(name = "habp", version, about = "Converge a Habitat supervisor on a remote host")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Check a desired-state document and report every problem found.
    Validate { file: PathBuf },
    /// Print the supervisor options and systemd unit without contacting a host.
    Render { file: PathBuf },
    /// Converge a host to the desired state.
    Apply(ApplyArgs),
}

#[derive(clap::Args)]
struct ApplyArgs {
    file: PathBuf,

    #[arg(long, env = "HABP_HOST")]
    host: String,

    #[arg(long, env = "HABP_USER", default_value = "root")]
    user: String,

    #[arg(long, default_value_t = 22)]
    port: u16,

    /// SSH private key.
    #[arg(long, env = "HABP_IDENTITY")]
    identity: Option<String>,

    /// Connection type: `ssh` for Linux hosts, `winrm` for Windows hosts.
    #[arg(long, default_value = "ssh")]
    platform: String,

    /// Overall connect budget in seconds.
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Give up waiting for the supervisor after this many seconds.
    #[arg(long)]
    health_deadline: Option<u64>,
}


fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli.command) {
        report_error(&e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hab_provision_core=debug,habp=debug"
    } else {
        "hab_provision_core=info,habp=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Validate { file } => validate(&file),
        Cmd::Render { file } => render(&file),
        Cmd::Apply(args) => apply(args),
    }
}


// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn load(file: &Path) -> Result<DesiredState> {
    data::load(file).with_context(|| format!("loading {}", file.display()))
}

fn validate(file: &Path) -> Result<()> {
    let state = load(file)?;
    println!(
        "{}: ok ({} service(s))",
        file.display(),
        state.config.services.len()
    );
    Ok(())
}

fn render(file: &Path) -> Result<()> {
    let state = load(file)?;
    let options = supervisor_options(&state.config);
    println!("# supervisor options");
    println!("{}", options.to_string().trim_start());
    println!();
    println!("# systemd unit");
    print!("{}", render_systemd_unit(&state.config, &options));
    Ok(())
}

fn apply(args: ApplyArgs) -> Result<()> {
    let DesiredState { config, mut settings } = load(&args.file)?;

    if let Some(secs) = args.connect_timeout {
        settings.connect.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.health_deadline {
        settings.health.deadline = Some(Duration::from_secs(secs));
    }

    let mut target = SshTarget::new(&args.host, &args.user);
    target.port = args.port;
    target.ssh_key = args.identity;
    let mut session = SshSession::new(target);

    tracing::debug!(host = %args.host, platform = %args.platform, "starting run");
    let provisioner = Provisioner::new(config, settings);
    let report = provisioner.run(&args.platform, &mut session, &TracingSink)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}


fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::Config(faults)) => {
            eprintln!("habp: invalid configuration");
            for fault in faults {
                eprintln!("  {}", fault);
            }
        }
        Some(ProvisionError::Convergence { failures, converged }) => {
            eprintln!("habp: {} service(s) failed to converge", failures.len());
            for failure in failures {
                eprintln!("  {}", failure);
            }
            if !converged.is_empty() {
                eprintln!("converged: {}", converged.join(", "));
            }
        }
        _ => eprintln!("habp: {:#}", err),
    }
}
