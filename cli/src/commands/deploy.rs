//! `shipyard deploy`: ship one module to every selected target, all-or-nothing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shipyard_common::{FleetSettings, ModuleName, TargetKind};

use crate::app::AppContext;
use crate::application::ports::TargetConnection;
use crate::application::services::{
    DeployStrategy, HostTarballStrategy, Orchestrator, RegistryPushStrategy, VersionResolver,
};
use crate::domain::module::{ModuleSpec, module_spec};
use crate::domain::release::FleetReport;
use crate::domain::target::Target;
use crate::infra::artifacts::{FsArtifactInspector, OsFs};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{self, FleetConfig};
use crate::infra::http::UreqProbe;
use crate::infra::registry::RegistryConnection;
use crate::infra::ssh::SshConnection;
use crate::output::json;

type Resolver = VersionResolver<TokioCommandRunner, OsFs>;

#[derive(Args)]
pub struct DeployArgs {
    /// Module to deploy
    #[arg(short, long, value_enum)]
    pub module: ModuleName,

    /// Target kind (default: the module's usual kind)
    #[arg(long, value_enum)]
    pub via: Option<TargetKind>,

    /// Deploy this version instead of computing one (validated as semver)
    #[arg(long = "version", value_name = "VERSION")]
    pub release_version: Option<String>,

    /// Pre-built image archive to push (registry targets only)
    #[arg(long, value_name = "PATH")]
    pub artifact_path: Option<PathBuf>,

    /// Restrict the run to these targets (repeatable; default: all of the kind)
    #[arg(long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Fleet file (default: $SHIPYARD_FLEET, then ~/.shipyard/fleet.yaml)
    #[arg(long, value_name = "PATH")]
    pub fleet: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// # Errors
///
/// Returns an error if configuration is invalid, the user declines, or the
/// fleet deploy does not succeed on every target.
pub async fn run(app: &AppContext, args: DeployArgs) -> Result<()> {
    let cfg = config::load(args.fleet.as_deref())?;
    let spec = module_spec(args.module);
    let kind = args.via.unwrap_or(spec.default_target);
    if kind == TargetKind::Host && args.artifact_path.is_some() {
        anyhow::bail!("--artifact-path applies to registry targets only");
    }

    let command_timeout = Duration::from_secs(cfg.settings.command_timeout_secs);
    let runner = TokioCommandRunner::new(command_timeout);
    let resolver = VersionResolver::new(runner, OsFs, &cfg.repo_root)
        .with_override(args.release_version.clone())
        .with_timeout(command_timeout);

    let report = match kind {
        TargetKind::Host => {
            let hosts: Vec<_> = cfg
                .targets
                .select(kind, &args.targets)?
                .into_iter()
                .filter_map(Target::into_host)
                .collect();
            let names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
            if !confirmed(app, &resolver, spec, kind, &names).await? {
                return Ok(());
            }
            let connections = hosts
                .into_iter()
                .map(|host| {
                    SshConnection::new(
                        host,
                        runner,
                        connect_timeout(&cfg),
                        command_timeout,
                    )
                })
                .collect();
            let strategy = HostTarballStrategy::new(FsArtifactInspector, &cfg.repo_root);
            deploy_with(app, &resolver, &strategy, spec, cfg.settings.clone(), connections).await
        }
        TargetKind::Registry => {
            let registries: Vec<_> = cfg
                .targets
                .select(kind, &args.targets)?
                .into_iter()
                .filter_map(Target::into_registry)
                .collect();
            let names: Vec<&str> = registries.iter().map(|r| r.name.as_str()).collect();
            if !confirmed(app, &resolver, spec, kind, &names).await? {
                return Ok(());
            }
            let connections = registries
                .into_iter()
                .map(|registry| {
                    RegistryConnection::new(
                        registry,
                        runner,
                        connect_timeout(&cfg),
                        command_timeout,
                    )
                })
                .collect();
            let strategy = RegistryPushStrategy::new(FsArtifactInspector, UreqProbe, &cfg.repo_root)
                .with_artifact_override(args.artifact_path.clone());
            deploy_with(app, &resolver, &strategy, spec, cfg.settings.clone(), connections).await
        }
    };

    if app.is_json() {
        json::print(&report)?;
    } else {
        app.renderer().render_report(&report);
    }
    match report.error {
        None if report.is_success() => Ok(()),
        Some(reason) => anyhow::bail!("deploy of {} failed: {reason}", report.module),
        None => anyhow::bail!("deploy of {} failed", report.module),
    }
}

fn connect_timeout(cfg: &FleetConfig) -> Duration {
    Duration::from_secs(cfg.settings.connect_timeout_secs)
}

async fn deploy_with<C, S>(
    app: &AppContext,
    resolver: &Resolver,
    strategy: &S,
    spec: &'static ModuleSpec,
    settings: FleetSettings,
    connections: Vec<C>,
) -> FleetReport
where
    C: TargetConnection,
    S: DeployStrategy<C>,
{
    let reporter = app.reporter();
    Orchestrator::new(resolver, strategy, &reporter, settings)
        .deploy_fleet(spec, connections)
        .await
}

/// Ask before touching the fleet. The version is resolved and checked
/// against the last release up front so the prompt can name it; the
/// orchestrator reuses the cached values.
async fn confirmed(
    app: &AppContext,
    resolver: &Resolver,
    spec: &'static ModuleSpec,
    kind: TargetKind,
    names: &[&str],
) -> Result<bool> {
    if app.non_interactive || names.is_empty() {
        return Ok(true);
    }
    let version = resolver.get_version(spec).await?;
    resolver.ensure_newer_than_released(spec).await?;
    let prompt = format!(
        "Deploy {}@{version} to {} {kind} target(s): {}?",
        spec.name,
        names.len(),
        names.join(", ")
    );
    if app.confirm(&prompt)? {
        Ok(true)
    } else {
        app.output.info("Deploy cancelled.");
        Ok(false)
    }
}
