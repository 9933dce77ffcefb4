//! Command implementations

pub mod deploy;
pub mod resolve_version;
pub mod targets;
pub mod version;
