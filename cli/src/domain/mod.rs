//! Domain layer: pure types and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod error;
pub mod health;
pub mod module;
pub mod release;
pub mod target;
pub mod version;

pub use error::{
    ConfigError, ConnectionError, DeployError, FinalizeError, FleetError, ResolutionError,
    RollbackError,
};
pub use health::HealthStatus;
pub use module::{ModuleSpec, VersionFile, module_spec};
pub use release::{DeployRecord, FleetOutcome, FleetReport, ReleaseLayout};
pub use target::{HostTarget, RegistryTarget, Secret, Target, TargetSet};
