use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A deployable module. The set is closed: anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ModuleName {
    Website,
    Api,
    Bulletin,
}

impl ModuleName {
    pub const ALL: [ModuleName; 3] = [ModuleName::Website, ModuleName::Api, ModuleName::Bulletin];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleName::Website => "website",
            ModuleName::Api => "api",
            ModuleName::Bulletin => "bulletin",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a module identifier is outside the allow-list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown module '{0}' (expected one of: website, api, bulletin)")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleName {
    type Err = UnknownModule;

    /// Accepts the short name or the repository path of the module.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" | "web/bible-on-site" => Ok(ModuleName::Website),
            "api" | "web/api" => Ok(ModuleName::Api),
            "bulletin" | "web/bulletin" => Ok(ModuleName::Bulletin),
            other => Err(UnknownModule(other.to_string())),
        }
    }
}

/// The kind of destination a module is shipped to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Remote host reached over SSH; receives a release tarball.
    Host,
    /// Container registry account; receives a pushed image.
    Registry,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Host => "host",
            TargetKind::Registry => "registry",
        })
    }
}

/// Lifecycle phase of one (module, target) deployment.
///
/// Active phases advance in declaration order. `Succeeded` and `Failed` are
/// terminal for the deploy itself; `RolledBack` and `Finalized` record the
/// fleet-level follow-up actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Idle,
    CheckingPreconditions,
    Deploying,
    VerifyingPostconditions,
    Succeeded,
    Failed,
    RolledBack,
    Finalized,
}

impl DeployPhase {
    /// `true` once the deploy itself has finished, successfully or not,
    /// and nothing has been undone or made permanent yet.
    #[must_use]
    pub fn can_roll_back(self) -> bool {
        matches!(self, DeployPhase::Succeeded | DeployPhase::Failed)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployPhase::Idle => "idle",
            DeployPhase::CheckingPreconditions => "checking preconditions",
            DeployPhase::Deploying => "deploying",
            DeployPhase::VerifyingPostconditions => "verifying postconditions",
            DeployPhase::Succeeded => "succeeded",
            DeployPhase::Failed => "failed",
            DeployPhase::RolledBack => "rolled back",
            DeployPhase::Finalized => "finalized",
        })
    }
}

/// State of a target connection. `Disconnected` after a teardown is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}
