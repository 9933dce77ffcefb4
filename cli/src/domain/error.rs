//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use shipyard_common::ModuleName;

use crate::domain::release::FleetOutcome;

// ── Version resolution ────────────────────────────────────────────────────────

/// Failure to compute a module's version. Fatal before any target is touched.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("invalid version override '{value}': {reason}")]
    InvalidOverride { value: String, reason: String },

    #[error(
        "cannot resolve version for {module}: '{command}' failed ({command_error}) \
         and {file} could not be used ({file_error})"
    )]
    Unresolvable {
        module: ModuleName,
        command: String,
        command_error: String,
        file: String,
        file_error: String,
    },

    #[error(
        "{module} version {version} is not greater than released version {released}; \
         bump {file} before deploying"
    )]
    NotNewerThanReleased {
        module: ModuleName,
        version: String,
        released: String,
        file: String,
    },

    #[error("cannot compare {module} version with released tag {tag}: {reason}")]
    Incomparable {
        module: ModuleName,
        tag: String,
        reason: String,
    },
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Failure to establish the channel to one target.
#[derive(Debug, Error)]
#[error("cannot connect to target '{target}': {reason}")]
pub struct ConnectionError {
    pub target: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// ── Per-target deploy phases ──────────────────────────────────────────────────

/// Failure of one deploy phase on one target. Triggers fleet rollback.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("precondition failed on '{target}': {reason}")]
    Precondition { target: String, reason: String },

    #[error("deploy failed on '{target}': {reason}")]
    Deploy { target: String, reason: String },

    #[error("postcondition failed on '{target}': {reason}")]
    Postcondition { target: String, reason: String },
}

impl DeployError {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            DeployError::Precondition { target, .. }
            | DeployError::Deploy { target, .. }
            | DeployError::Postcondition { target, .. } => target,
        }
    }
}

/// Best-effort rollback failure. Logged, never propagated.
#[derive(Debug, Error)]
#[error("rollback failed on '{target}': {reason}")]
pub struct RollbackError {
    pub target: String,
    pub reason: String,
}

/// Post-success cleanup failure. Reported, does not revert the deploy.
#[derive(Debug, Error)]
#[error("finalize failed on '{target}': {reason}")]
pub struct FinalizeError {
    pub target: String,
    pub reason: String,
}

impl FleetOutcome {
    /// Outcome recorded for a fleet run aborted by `err`.
    #[must_use]
    pub fn from_error(err: &FleetError) -> Self {
        match err {
            FleetError::NoTargets { .. } => FleetOutcome::NoTargets,
            FleetError::Resolution(_) => FleetOutcome::ResolutionFailed,
            FleetError::Connection(_) => FleetOutcome::ConnectionFailed,
            FleetError::Deploy(_) => FleetOutcome::DeployFailed,
        }
    }
}

// ── Fleet ─────────────────────────────────────────────────────────────────────

/// Reasons a fleet deploy is aborted.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("no {kind} targets selected for {module}")]
    NoTargets { module: ModuleName, kind: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to fleet configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown target '{name}'.\n\nConfigured {kind} targets: {available}")]
    UnknownTarget {
        name: String,
        kind: String,
        available: String,
    },

    #[error("Invalid target name '{0}': must contain only letters, digits, '-' or '_'")]
    InvalidTargetName(String),

    #[error("Target '{name}' is configured twice in the fleet file")]
    DuplicateTarget { name: String },
}
