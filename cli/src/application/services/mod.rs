//! Application services: deployment use cases.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod artifact;
pub mod connection_pool;
pub mod deployer;
pub mod health;
pub mod host_tarball;
pub mod orchestrator;
pub mod registry_push;
pub mod version_resolver;

pub use connection_pool::ConnectionPool;
pub use deployer::{DeployContext, DeployStrategy, Deployer};
pub use host_tarball::HostTarballStrategy;
pub use orchestrator::Orchestrator;
pub use registry_push::RegistryPushStrategy;
pub use version_resolver::VersionResolver;
