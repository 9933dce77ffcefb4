//! Per-target deployment lifecycle.
//!
//! One generic runner drives every target kind through
//! `Idle → CheckingPreconditions → Deploying → VerifyingPostconditions →
//! Succeeded`, with `Failed` reachable from any active phase. Target-specific
//! behaviour comes from a [`DeployStrategy`].
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use shipyard_common::{DeployPhase, FleetSettings, TargetKind};
use tracing::Instrument;

use crate::application::ports::{ProgressReporter, TargetConnection};
use crate::domain::error::{DeployError, FinalizeError, RollbackError};
use crate::domain::module::ModuleSpec;
use crate::domain::release::DeployRecord;

/// Everything a strategy needs to know about the deployment in progress.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub module: &'static ModuleSpec,
    pub version: String,
    pub target: String,
    pub artifact: PathBuf,
    pub settings: FleetSettings,
}

/// Capability set of one target kind.
///
/// Every fallible step returns `anyhow::Result`; the [`Deployer`] maps the
/// failure into the typed phase error.
#[allow(async_fn_in_trait)]
pub trait DeployStrategy<C> {
    fn kind(&self) -> TargetKind;

    /// Local artifact to ship for `version`.
    fn artifact_path(&self, module: &ModuleSpec, version: &str) -> PathBuf;

    /// Checks run before anything on the target changes.
    async fn check_preconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()>;

    /// Capture the last-known-good version, `None` on a fresh target.
    async fn snapshot(&self, conn: &C, ctx: &DeployContext) -> Result<Option<String>>;

    /// Transfer and activate the artifact.
    async fn core_deploy(&self, conn: &C, ctx: &DeployContext) -> Result<()>;

    /// Confirm the new version is live and healthy.
    async fn check_postconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()>;

    /// Restore `previous` (or deactivate, when there was none).
    async fn rollback(&self, conn: &C, ctx: &DeployContext, previous: Option<&str>) -> Result<()>;

    /// Non-critical cleanup after the whole fleet succeeded.
    async fn finalize(&self, conn: &C, ctx: &DeployContext) -> Result<()>;
}

/// Drives one (module, target) pair through its lifecycle.
///
/// The connection is borrowed from the pool; [`Deployer::dispose`] only
/// releases the borrow, the pool tears the channel down.
pub struct Deployer<'a, C, S, P> {
    conn: Option<&'a C>,
    strategy: &'a S,
    reporter: &'a P,
    ctx: DeployContext,
    record: DeployRecord,
    rollback_attempted: bool,
}

impl<'a, C, S, P> Deployer<'a, C, S, P>
where
    C: TargetConnection,
    S: DeployStrategy<C>,
    P: ProgressReporter,
{
    pub fn new(conn: &'a C, strategy: &'a S, reporter: &'a P, ctx: DeployContext) -> Self {
        let record = DeployRecord::new(ctx.module.name, &ctx.version, &ctx.target, strategy.kind());
        Self {
            conn: Some(conn),
            strategy,
            reporter,
            ctx,
            record,
            rollback_attempted: false,
        }
    }

    #[must_use]
    pub fn phase(&self) -> DeployPhase {
        self.record.phase
    }

    #[must_use]
    pub fn record(&self) -> &DeployRecord {
        &self.record
    }

    #[must_use]
    pub fn into_record(self) -> DeployRecord {
        self.record
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.ctx.target
    }

    /// Run preconditions, core deploy and postconditions.
    ///
    /// # Errors
    ///
    /// Returns the typed error of the first failing phase; the deployer is
    /// then `Failed`. A deployer runs at most once.
    pub async fn deploy(&mut self) -> Result<(), DeployError> {
        let span = tracing::info_span!(
            "deploy",
            module = %self.ctx.module.name,
            version = %self.ctx.version,
            target_name = %self.ctx.target,
        );
        self.run_phases().instrument(span).await
    }

    async fn run_phases(&mut self) -> Result<(), DeployError> {
        if self.record.phase != DeployPhase::Idle {
            return Err(DeployError::Deploy {
                target: self.ctx.target.clone(),
                reason: format!("deployer already ran (phase: {})", self.record.phase),
            });
        }
        let Some(conn) = self.conn else {
            return Err(DeployError::Deploy {
                target: self.ctx.target.clone(),
                reason: "connection already released".to_string(),
            });
        };
        let strategy = self.strategy;
        self.record.started_at = Some(Utc::now());

        self.enter(DeployPhase::CheckingPreconditions, "checking preconditions...");
        if let Err(e) = strategy.check_preconditions(conn, &self.ctx).await {
            return Err(self.fail(DeployError::Precondition {
                target: self.ctx.target.clone(),
                reason: format!("{e:#}"),
            }));
        }
        match strategy.snapshot(conn, &self.ctx).await {
            Ok(previous) => {
                tracing::info!(previous = previous.as_deref().unwrap_or("none"), "snapshot taken");
                self.record.previous_version = previous;
            }
            Err(e) => {
                return Err(self.fail(DeployError::Precondition {
                    target: self.ctx.target.clone(),
                    reason: format!("cannot capture last-known-good version: {e:#}"),
                }));
            }
        }

        self.enter(DeployPhase::Deploying, "deploying...");
        if let Err(e) = strategy.core_deploy(conn, &self.ctx).await {
            return Err(self.fail(DeployError::Deploy {
                target: self.ctx.target.clone(),
                reason: format!("{e:#}"),
            }));
        }

        self.enter(DeployPhase::VerifyingPostconditions, "verifying postconditions...");
        if let Err(e) = strategy.check_postconditions(conn, &self.ctx).await {
            return Err(self.fail(DeployError::Postcondition {
                target: self.ctx.target.clone(),
                reason: format!("{e:#}"),
            }));
        }

        self.record.phase = DeployPhase::Succeeded;
        self.record.finished_at = Some(Utc::now());
        tracing::info!(phase = %DeployPhase::Succeeded, "deploy succeeded");
        self.reporter
            .success(&self.tagged(&format!("{} deployed", self.ctx.version)));
        Ok(())
    }

    /// Restore the last-known-good version.
    ///
    /// Only acts once, and only from `Succeeded` or `Failed`. Failures are
    /// logged and recorded, never returned.
    pub async fn rollback(&mut self) {
        let span = tracing::info_span!(
            "rollback",
            module = %self.ctx.module.name,
            version = %self.ctx.version,
            target_name = %self.ctx.target,
        );
        self.run_rollback().instrument(span).await;
    }

    async fn run_rollback(&mut self) {
        if !self.record.phase.can_roll_back() {
            tracing::debug!(phase = %self.record.phase, "rollback skipped");
            return;
        }
        if self.rollback_attempted {
            return;
        }
        self.rollback_attempted = true;

        let previous = self.record.previous_version.clone();
        self.reporter.step(&self.tagged(&format!(
            "rolling back to {}...",
            previous.as_deref().unwrap_or("no previous release")
        )));

        let result = match self.conn {
            Some(conn) => self
                .strategy
                .rollback(conn, &self.ctx, previous.as_deref())
                .await
                .map_err(|e| format!("{e:#}")),
            None => Err("connection already released".to_string()),
        };
        match result {
            Ok(()) => {
                self.record.phase = DeployPhase::RolledBack;
                self.record.rolled_back = true;
                tracing::info!(phase = %DeployPhase::RolledBack, "rolled back");
                self.reporter.success(&self.tagged("rolled back"));
            }
            Err(reason) => {
                let err = RollbackError {
                    target: self.ctx.target.clone(),
                    reason,
                };
                tracing::error!(error = %err, "rollback failed");
                self.reporter.warn(&self.tagged(&err.to_string()));
                self.record.rollback_error = Some(err.reason);
            }
        }
    }

    /// Non-critical cleanup once the whole fleet succeeded.
    ///
    /// # Errors
    ///
    /// Returns `FinalizeError` if the deployer has not succeeded or the
    /// cleanup fails. The deployment itself stays `Succeeded`.
    pub async fn finalize_deployment(&mut self) -> Result<(), FinalizeError> {
        let fail = |reason: String| FinalizeError {
            target: self.ctx.target.clone(),
            reason,
        };
        if self.record.phase != DeployPhase::Succeeded {
            return Err(fail(format!("cannot finalize from phase {}", self.record.phase)));
        }
        let Some(conn) = self.conn else {
            return Err(fail("connection already released".to_string()));
        };
        match self.strategy.finalize(conn, &self.ctx).await {
            Ok(()) => {
                self.record.phase = DeployPhase::Finalized;
                self.record.finalized = true;
                tracing::info!(target_name = %self.ctx.target, phase = %DeployPhase::Finalized, "finalized");
                Ok(())
            }
            Err(e) => {
                let err = fail(format!("{e:#}"));
                tracing::warn!(error = %err, "finalize failed");
                self.reporter.warn(&self.tagged(&err.to_string()));
                Err(err)
            }
        }
    }

    /// Release the borrowed connection. Idempotent.
    pub fn dispose(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!(target_name = %self.ctx.target, "deployer released connection");
        }
    }

    /// `[module@target] message`
    fn tagged(&self, message: &str) -> String {
        format!("[{}@{}] {message}", self.ctx.module.name, self.ctx.target)
    }

    fn enter(&mut self, phase: DeployPhase, message: &str) {
        self.record.phase = phase;
        tracing::info!(phase = %phase, "phase entered");
        self.reporter.step(&self.tagged(message));
    }

    fn fail(&mut self, err: DeployError) -> DeployError {
        self.record.phase = DeployPhase::Failed;
        self.record.finished_at = Some(Utc::now());
        self.record.error = Some(err.to_string());
        tracing::error!(phase = %DeployPhase::Failed, error = %err, "deploy failed");
        self.reporter.error(&self.tagged(&err.to_string()));
        err
    }
}
