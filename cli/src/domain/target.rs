//! Deployment targets and credential discovery.
//!
//! Discovery works on an explicit list of `(key, value)` pairs so it never
//! reads process-global state; the infra layer feeds it `std::env::vars()`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shipyard_common::TargetKind;

use crate::domain::error::ConfigError;

/// Environment prefix for host target fields.
pub const HOST_ENV_PREFIX: &str = "SHIPYARD_HOST_";
/// Environment prefix for registry target fields.
pub const REGISTRY_ENV_PREFIX: &str = "SHIPYARD_REGISTRY_";

static HOST_KEY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // constant pattern
    Regex::new(r"^SHIPYARD_HOST_([A-Za-z0-9_]+?)_(IP|USER|SSH_KEY|PASSPHRASE)$").unwrap()
});

static REGISTRY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // constant pattern
    Regex::new(r"^SHIPYARD_REGISTRY_([A-Za-z0-9_]+?)_(URL|ACCOUNT|TOKEN|HEALTH_URL)$").unwrap()
});

// ── Secret ────────────────────────────────────────────────────────────────────

/// A credential value that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

// ── Targets ───────────────────────────────────────────────────────────────────

/// A remote host reached over SSH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostTarget {
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Private key: a file path or the key material itself.
    #[serde(default)]
    pub ssh_key: Option<Secret>,
    #[serde(default)]
    pub passphrase: Option<Secret>,
}

/// A container registry account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryTarget {
    pub name: String,
    /// Registry host, e.g. `123456789012.dkr.ecr.il-central-1.amazonaws.com`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub token: Option<Secret>,
    /// Public URL of the service fed from this registry, polled after a push.
    #[serde(default)]
    pub health_url: Option<String>,
}

/// One deployment destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Host(HostTarget),
    Registry(RegistryTarget),
}

impl Target {
    #[must_use]
    pub fn into_host(self) -> Option<HostTarget> {
        match self {
            Target::Host(h) => Some(h),
            Target::Registry(_) => None,
        }
    }

    #[must_use]
    pub fn into_registry(self) -> Option<RegistryTarget> {
        match self {
            Target::Registry(r) => Some(r),
            Target::Host(_) => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Target::Host(h) => &h.name,
            Target::Registry(r) => &r.name,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Host(_) => TargetKind::Host,
            Target::Registry(_) => TargetKind::Registry,
        }
    }
}

/// All configured targets, keyed by normalised name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    pub hosts: BTreeMap<String, HostTarget>,
    pub registries: BTreeMap<String, RegistryTarget>,
}

// ── Names ─────────────────────────────────────────────────────────────────────

/// Normalise a target name: lowercase, `_` → `-`.
///
/// `PROD_1` from `SHIPYARD_HOST_PROD_1_IP` and `prod-1` in the fleet file
/// refer to the same target.
///
/// # Errors
///
/// Returns `ConfigError::InvalidTargetName` for empty names or names with
/// characters outside `[A-Za-z0-9_-]`.
pub fn normalize_name(raw: &str) -> Result<String, ConfigError> {
    if raw.is_empty()
        || !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::InvalidTargetName(raw.to_string()));
    }
    Ok(raw.to_ascii_lowercase().replace('_', "-"))
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Build targets from environment-style `(key, value)` pairs.
///
/// A target exists as soon as one of its fields is assigned. Keys that do not
/// match either prefix pattern are ignored, as are empty values.
#[must_use]
pub fn discover<I, K, V>(vars: I) -> TargetSet
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut set = TargetSet::default();
    for (key, value) in vars {
        let (key, value) = (key.as_ref(), value.as_ref());
        if value.is_empty() {
            continue;
        }
        if let Some(caps) = HOST_KEY.captures(key) {
            let Ok(name) = normalize_name(&caps[1]) else { continue };
            let host = set.hosts.entry(name.clone()).or_insert_with(|| HostTarget {
                name,
                ..HostTarget::default()
            });
            match &caps[2] {
                "IP" => host.ip = Some(value.to_string()),
                "USER" => host.user = Some(value.to_string()),
                "SSH_KEY" => host.ssh_key = Some(Secret::new(value)),
                _ => host.passphrase = Some(Secret::new(value)),
            }
        } else if let Some(caps) = REGISTRY_KEY.captures(key) {
            let Ok(name) = normalize_name(&caps[1]) else { continue };
            let reg = set
                .registries
                .entry(name.clone())
                .or_insert_with(|| RegistryTarget {
                    name,
                    ..RegistryTarget::default()
                });
            match &caps[2] {
                "URL" => reg.url = Some(value.to_string()),
                "ACCOUNT" => reg.account = Some(value.to_string()),
                "TOKEN" => reg.token = Some(Secret::new(value)),
                _ => reg.health_url = Some(value.to_string()),
            }
        }
    }
    set
}

impl TargetSet {
    /// Overlay `other` on top of `self`, field by field.
    ///
    /// Fields set in `other` win; unset fields keep the value from `self`.
    #[must_use]
    pub fn merged_with(mut self, other: TargetSet) -> TargetSet {
        for (name, host) in other.hosts {
            let entry = self.hosts.entry(name).or_insert_with(|| HostTarget {
                name: host.name.clone(),
                ..HostTarget::default()
            });
            entry.ip = host.ip.or(entry.ip.take());
            entry.user = host.user.or(entry.user.take());
            entry.ssh_key = host.ssh_key.or(entry.ssh_key.take());
            entry.passphrase = host.passphrase.or(entry.passphrase.take());
        }
        for (name, reg) in other.registries {
            let entry = self.registries.entry(name).or_insert_with(|| RegistryTarget {
                name: reg.name.clone(),
                ..RegistryTarget::default()
            });
            entry.url = reg.url.or(entry.url.take());
            entry.account = reg.account.or(entry.account.take());
            entry.token = reg.token.or(entry.token.take());
            entry.health_url = reg.health_url.or(entry.health_url.take());
        }
        self
    }

    /// Names of the targets of one kind, in sorted order.
    #[must_use]
    pub fn names(&self, kind: TargetKind) -> Vec<String> {
        match kind {
            TargetKind::Host => self.hosts.keys().cloned().collect(),
            TargetKind::Registry => self.registries.keys().cloned().collect(),
        }
    }

    /// Pick the targets of `kind` to deploy to.
    ///
    /// An empty `requested` list selects every target of that kind in name
    /// order. Otherwise the requested order is kept and repeated names are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownTarget` if a requested name is not configured.
    pub fn select(&self, kind: TargetKind, requested: &[String]) -> Result<Vec<Target>, ConfigError> {
        let all = self.names(kind);
        let mut names: Vec<String> = Vec::with_capacity(requested.len());
        if requested.is_empty() {
            names.clone_from(&all);
        }
        for raw in requested {
            let name = normalize_name(raw)?;
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
            .into_iter()
            .map(|name| {
                let found = match kind {
                    TargetKind::Host => self.hosts.get(&name).cloned().map(Target::Host),
                    TargetKind::Registry => {
                        self.registries.get(&name).cloned().map(Target::Registry)
                    }
                };
                found.ok_or_else(|| ConfigError::UnknownTarget {
                    name,
                    kind: kind.to_string(),
                    available: if all.is_empty() {
                        "(none)".to_string()
                    } else {
                        all.join(", ")
                    },
                })
            })
            .collect()
    }
}
