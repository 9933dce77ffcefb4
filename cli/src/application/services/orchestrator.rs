//! Fleet deploy: resolve once, connect all, deploy sequentially, roll back
//! the already-succeeded targets on the first failure.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use shipyard_common::FleetSettings;

use crate::application::ports::{CommandRunner, LocalFs, ProgressReporter, TargetConnection};
use crate::application::services::connection_pool::ConnectionPool;
use crate::application::services::deployer::{DeployContext, DeployStrategy, Deployer};
use crate::application::services::version_resolver::VersionResolver;
use crate::domain::error::FleetError;
use crate::domain::module::ModuleSpec;
use crate::domain::release::{DeployRecord, FleetOutcome, FleetReport};

/// Sequences deployers across a connection pool.
pub struct Orchestrator<'a, R, F, S, P> {
    resolver: &'a VersionResolver<R, F>,
    strategy: &'a S,
    reporter: &'a P,
    settings: FleetSettings,
}

impl<'a, R, F, S, P> Orchestrator<'a, R, F, S, P>
where
    R: CommandRunner,
    F: LocalFs,
    P: ProgressReporter,
{
    pub fn new(
        resolver: &'a VersionResolver<R, F>,
        strategy: &'a S,
        reporter: &'a P,
        settings: FleetSettings,
    ) -> Self {
        Self {
            resolver,
            strategy,
            reporter,
            settings,
        }
    }

    /// Deploy `module` to every connection, all-or-nothing.
    ///
    /// The version is resolved and checked against the last released tag
    /// before any target is contacted. Connections are then established as a
    /// barrier; a failure there aborts before any deployer exists. Targets deploy one at a time. On the first failure,
    /// every target that already succeeded is rolled back (newest first),
    /// the remaining targets are never attempted, and every connection is
    /// disposed. When all succeed, each deployer is finalized and then
    /// disposed.
    ///
    /// Never returns an error: the outcome and cause are in the report.
    pub async fn deploy_fleet<C>(&self, module: &'static ModuleSpec, connections: Vec<C>) -> FleetReport
    where
        C: TargetConnection,
        S: DeployStrategy<C>,
    {
        let mut report = FleetReport::new(module.name, self.strategy.kind());
        if let Err(err) = self.run(module, connections, &mut report).await {
            tracing::error!(module = %module.name, error = %err, "fleet deploy aborted");
            report.outcome = FleetOutcome::from_error(&err);
            report.error = Some(err.to_string());
        }
        report
    }

    async fn run<C>(
        &self,
        module: &'static ModuleSpec,
        connections: Vec<C>,
        report: &mut FleetReport,
    ) -> Result<(), FleetError>
    where
        C: TargetConnection,
        S: DeployStrategy<C>,
    {
        if connections.is_empty() {
            return Err(FleetError::NoTargets {
                module: module.name,
                kind: self.strategy.kind().to_string(),
            });
        }

        let version = self.resolver.get_version(module).await?;
        report.version = Some(version.clone());
        self.resolver.ensure_newer_than_released(module).await?;
        self.reporter.step(&format!(
            "[{}] deploying {} ({}) to {} {} target(s)",
            module.name,
            version,
            module.tag(&version),
            connections.len(),
            self.strategy.kind(),
        ));
        let artifact = self.strategy.artifact_path(module, &version);
        tracing::info!(module = %module.name, %version, artifact = %artifact.display(), "artifact selected");

        let pool = ConnectionPool::establish(connections, self.reporter).await?;

        let mut succeeded: Vec<Deployer<'_, C, S, P>> = Vec::with_capacity(pool.len());
        for (index, conn) in pool.connections().iter().enumerate() {
            let ctx = DeployContext {
                module,
                version: version.clone(),
                target: conn.target_name().to_string(),
                artifact: artifact.clone(),
                settings: self.settings.clone(),
            };
            let mut deployer = Deployer::new(conn, self.strategy, self.reporter, ctx);
            if let Err(err) = deployer.deploy().await {
                self.abort(succeeded, deployer, &pool.connections()[index + 1..], report)
                    .await;
                pool.dispose_all().await;
                return Err(err.into());
            }
            succeeded.push(deployer);
        }

        for deployer in &mut succeeded {
            if let Err(e) = deployer.finalize_deployment().await {
                report.warnings.push(e.to_string());
            }
        }
        for mut deployer in succeeded {
            deployer.dispose();
            report.records.push(deployer.into_record());
        }
        pool.dispose_all().await;
        self.reporter.success(&format!(
            "[{}] {version} live on {} target(s)",
            module.name,
            report.records.len()
        ));
        Ok(())
    }

    async fn abort<C>(
        &self,
        succeeded: Vec<Deployer<'_, C, S, P>>,
        mut failed: Deployer<'_, C, S, P>,
        untouched: &[C],
        report: &mut FleetReport,
    ) where
        C: TargetConnection,
        S: DeployStrategy<C>,
    {
        if !succeeded.is_empty() {
            self.reporter.warn(&format!(
                "rolling back {} already-deployed target(s)",
                succeeded.len()
            ));
        }
        let mut rolled: Vec<DeployRecord> = Vec::with_capacity(succeeded.len());
        for mut deployer in succeeded.into_iter().rev() {
            deployer.rollback().await;
            deployer.dispose();
            rolled.push(deployer.into_record());
        }
        rolled.reverse();
        report.records.extend(rolled);

        failed.dispose();
        report.records.push(failed.into_record());

        let version = report.version.clone().unwrap_or_default();
        for conn in untouched {
            tracing::info!(target_name = conn.target_name(), "not attempted");
            report.records.push(DeployRecord::new(
                report.module,
                &version,
                conn.target_name(),
                report.kind,
            ));
        }
    }
}
