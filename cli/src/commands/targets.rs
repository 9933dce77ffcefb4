//! `shipyard targets`: list configured targets with credentials masked.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::domain::target::{HostTarget, RegistryTarget, TargetSet};
use crate::infra::config;
use crate::output::json;

#[derive(Args)]
pub struct TargetsArgs {
    /// Fleet file (default: $SHIPYARD_FLEET, then ~/.shipyard/fleet.yaml)
    #[arg(long, value_name = "PATH")]
    pub fleet: Option<PathBuf>,
}

/// JSON view of a host; secrets reduced to presence flags.
#[derive(Serialize)]
struct HostView<'a> {
    name: &'a str,
    ip: Option<&'a str>,
    user: Option<&'a str>,
    ssh_key: bool,
    passphrase: bool,
}

#[derive(Serialize)]
struct RegistryView<'a> {
    name: &'a str,
    url: Option<&'a str>,
    account: Option<&'a str>,
    token: bool,
    health_url: Option<&'a str>,
}

#[derive(Serialize)]
struct TargetsView<'a> {
    fleet_file: Option<String>,
    hosts: Vec<HostView<'a>>,
    registries: Vec<RegistryView<'a>>,
}

impl<'a> From<&'a HostTarget> for HostView<'a> {
    fn from(h: &'a HostTarget) -> Self {
        Self {
            name: &h.name,
            ip: h.ip.as_deref(),
            user: h.user.as_deref(),
            ssh_key: h.ssh_key.is_some(),
            passphrase: h.passphrase.is_some(),
        }
    }
}

impl<'a> From<&'a RegistryTarget> for RegistryView<'a> {
    fn from(r: &'a RegistryTarget) -> Self {
        Self {
            name: &r.name,
            url: r.url.as_deref(),
            account: r.account.as_deref(),
            token: r.token.is_some(),
            health_url: r.health_url.as_deref(),
        }
    }
}

fn view(targets: &TargetSet, fleet_file: Option<String>) -> TargetsView<'_> {
    TargetsView {
        fleet_file,
        hosts: targets.hosts.values().map(HostView::from).collect(),
        registries: targets.registries.values().map(RegistryView::from).collect(),
    }
}

/// # Errors
///
/// Returns an error if configuration cannot be loaded.
pub fn run(app: &AppContext, args: &TargetsArgs) -> Result<()> {
    let cfg = config::load(args.fleet.as_deref())?;
    let source = cfg.source.as_ref().map(|p| p.display().to_string());

    if app.is_json() {
        return json::print(&view(&cfg.targets, source));
    }
    if let Some(path) = &source {
        app.output.kv("Fleet file:", path);
    }
    app.renderer().render_targets(&cfg.targets);
    Ok(())
}
