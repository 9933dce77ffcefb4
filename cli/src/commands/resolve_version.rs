//! `shipyard resolve-version`: print the version a deploy would use and the
//! latest released one.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shipyard_common::ModuleName;

use crate::app::AppContext;
use crate::application::services::VersionResolver;
use crate::domain::module::module_spec;
use crate::infra::artifacts::OsFs;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config;
use crate::output::json;

#[derive(Args)]
pub struct ResolveVersionArgs {
    /// Module to inspect
    #[arg(short, long, value_enum)]
    pub module: ModuleName,

    /// Use this version instead of computing one (validated as semver)
    #[arg(long = "version", value_name = "VERSION")]
    pub release_version: Option<String>,

    /// Fleet file (default: $SHIPYARD_FLEET, then ~/.shipyard/fleet.yaml)
    #[arg(long, value_name = "PATH")]
    pub fleet: Option<PathBuf>,
}

/// # Errors
///
/// Returns an error if configuration cannot be loaded or the version cannot
/// be resolved.
pub async fn run(app: &AppContext, args: ResolveVersionArgs) -> Result<()> {
    let cfg = config::load(args.fleet.as_deref())?;
    let timeout = Duration::from_secs(cfg.settings.command_timeout_secs);
    let spec = module_spec(args.module);

    let resolver = VersionResolver::new(TokioCommandRunner::new(timeout), OsFs, &cfg.repo_root)
        .with_override(args.release_version)
        .with_timeout(timeout);
    let version = resolver.get_version(spec).await?;
    let tag = spec.tag(&version);
    let released = resolver.released_version(spec).await;

    if app.is_json() {
        json::print(&serde_json::json!({
            "module": spec.name,
            "version": version,
            "tag": tag,
            "released": released,
        }))
    } else {
        app.renderer()
            .render_resolved(spec.display_name, &version, &tag, released.as_deref());
        Ok(())
    }
}
