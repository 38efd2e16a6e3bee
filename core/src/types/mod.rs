//! Desired-state records handed to a convergence run.

pub mod config;
pub mod service;

pub use config::{EventStream, ProvisionerConfig, ServiceManager};
pub use service::{Bind, PackageIdent, Service, Topology, UpdateStrategy};
