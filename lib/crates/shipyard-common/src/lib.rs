pub mod config;
pub mod types;

pub use config::FleetSettings;
pub use types::*;
