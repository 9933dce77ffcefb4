//! Fleet configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, the YAML fleet file,
//! then `SHIPYARD_*` environment variables (settings via `envy`, targets via
//! prefix discovery).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use shipyard_common::FleetSettings;

use crate::domain::error::ConfigError;
use crate::domain::target::{self, HostTarget, RegistryTarget, TargetSet, normalize_name};

/// Environment variable naming the fleet file.
pub const FLEET_ENV: &str = "SHIPYARD_FLEET";

/// On-disk fleet file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FleetFile {
    #[serde(default)]
    settings: FleetSettings,
    #[serde(default)]
    hosts: Vec<HostTarget>,
    #[serde(default)]
    registries: Vec<RegistryTarget>,
}

/// `SHIPYARD_*` scalar overrides.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    deploy_root: Option<String>,
    keep_releases: Option<usize>,
    max_artifact_mb: Option<u64>,
    health_timeout_secs: Option<u64>,
    health_interval_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    repo_root: Option<PathBuf>,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub settings: FleetSettings,
    pub targets: TargetSet,
    pub repo_root: PathBuf,
    /// Fleet file that was read, if any.
    pub source: Option<PathBuf>,
}

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns an error if the fleet file is unreadable or malformed, or if an
/// environment override has the wrong type.
pub fn load(explicit: Option<&Path>) -> Result<FleetConfig> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    load_from(explicit, std::env::vars().collect(), &cwd)
}

/// Load configuration from explicit inputs.
///
/// # Errors
///
/// See [`load`].
pub fn load_from(explicit: Option<&Path>, vars: Vec<(String, String)>, cwd: &Path) -> Result<FleetConfig> {
    let env: BTreeMap<&str, &str> = vars.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let (path, required) = match (explicit, env.get(FLEET_ENV)) {
        (Some(p), _) => (Some(p.to_path_buf()), true),
        (None, Some(p)) if !p.is_empty() => (Some(PathBuf::from(*p)), true),
        _ => (default_fleet_path(), false),
    };

    let (file, source) = match path {
        Some(p) if p.exists() => (read_fleet_file(&p)?, Some(p)),
        Some(p) if required => anyhow::bail!("fleet file {} not found", p.display()),
        _ => (FleetFile::default(), None),
    };

    let overrides: EnvOverrides = envy::prefixed("SHIPYARD_")
        .from_iter(vars.iter().cloned())
        .context("invalid SHIPYARD_* setting")?;

    let mut settings = file.settings;
    apply_overrides(&mut settings, &overrides);

    let from_file = target_set(file.hosts, file.registries)?;
    let targets = from_file.merged_with(target::discover(vars.iter().map(|(k, v)| (k, v))));

    let repo_root = match overrides.repo_root {
        Some(p) if p.is_absolute() => p,
        Some(p) => cwd.join(p),
        None => cwd.to_path_buf(),
    };

    tracing::debug!(
        source = ?source,
        hosts = targets.hosts.len(),
        registries = targets.registries.len(),
        repo_root = %repo_root.display(),
        "fleet configuration loaded"
    );
    Ok(FleetConfig {
        settings,
        targets,
        repo_root,
        source,
    })
}

fn default_fleet_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".shipyard").join("fleet.yaml"))
}

fn read_fleet_file(path: &Path) -> Result<FleetFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(FleetFile::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
}

fn apply_overrides(settings: &mut FleetSettings, o: &EnvOverrides) {
    if let Some(v) = &o.deploy_root {
        settings.deploy_root.clone_from(v);
    }
    if let Some(v) = o.keep_releases {
        settings.keep_releases = v;
    }
    if let Some(v) = o.max_artifact_mb {
        settings.max_artifact_mb = v;
    }
    if let Some(v) = o.health_timeout_secs {
        settings.health_timeout_secs = v;
    }
    if let Some(v) = o.health_interval_secs {
        settings.health_interval_secs = v;
    }
    if let Some(v) = o.connect_timeout_secs {
        settings.connect_timeout_secs = v;
    }
    if let Some(v) = o.command_timeout_secs {
        settings.command_timeout_secs = v;
    }
}

/// Index fleet-file targets by normalised name.
fn target_set(hosts: Vec<HostTarget>, registries: Vec<RegistryTarget>) -> Result<TargetSet, ConfigError> {
    let mut set = TargetSet::default();
    for mut host in hosts {
        let name = normalize_name(&host.name)?;
        host.name.clone_from(&name);
        if set.hosts.insert(name.clone(), host).is_some() {
            return Err(ConfigError::DuplicateTarget { name });
        }
    }
    for mut reg in registries {
        let name = normalize_name(&reg.name)?;
        reg.name.clone_from(&name);
        if set.registries.insert(name.clone(), reg).is_some() {
            return Err(ConfigError::DuplicateTarget { name });
        }
    }
    Ok(set)
}
