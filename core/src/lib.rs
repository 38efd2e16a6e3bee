//! Idempotent convergence of a Habitat supervisor and its services on a
//! remote host.
//!
//! A run takes a [`ProvisionerConfig`], a [`Session`] to the target and a
//! platform descriptor, and drives the host to the desired state through a
//! [`Provisioner`]. The supervisor is only restarted when its rendered
//! launch artifact differs from what the host already has.

pub mod artifact;
pub mod backend;
pub mod compose;
pub mod convergence;
pub mod data;
pub mod error;
pub mod infrastructure;
pub mod loader;
pub mod orchestrator;
pub mod supervisor;
pub mod types;

pub use backend::{backend_for, Backend, Platform};
pub use error::{ProvisionError, Result};
pub use infrastructure::{OutputSink, Session, SshSession, SshTarget, TracingSink};
pub use orchestrator::{Provisioner, RunReport, RunSettings};
pub use types::{ProvisionerConfig, Service};
