//! Desired-state input: YAML loading and batched validation.

pub mod desired_state;
pub mod validate;

pub use desired_state::{load, parse, DesiredState};
pub use validate::Faults;
