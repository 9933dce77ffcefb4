//! Release bookkeeping: deploy records, remote release layout, pruning.
//!
//! Pure functions only; no I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shipyard_common::{DeployPhase, ModuleName, TargetKind};

// ── Deploy record ─────────────────────────────────────────────────────────────

/// What happened to one (module, target) pair during a run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployRecord {
    pub module: ModuleName,
    pub version: String,
    pub target: String,
    pub kind: TargetKind,
    pub phase: DeployPhase,
    /// Last-known-good release captured before the deploy, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rolled_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
    pub finalized: bool,
}

impl DeployRecord {
    #[must_use]
    pub fn new(module: ModuleName, version: &str, target: &str, kind: TargetKind) -> Self {
        Self {
            module,
            version: version.to_string(),
            target: target.to_string(),
            kind,
            phase: DeployPhase::Idle,
            previous_version: None,
            started_at: None,
            finished_at: None,
            error: None,
            rolled_back: false,
            rollback_error: None,
            finalized: false,
        }
    }
}

// ── Fleet report ──────────────────────────────────────────────────────────────

/// How a fleet run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetOutcome {
    Succeeded,
    NoTargets,
    ResolutionFailed,
    ConnectionFailed,
    DeployFailed,
}

impl FleetOutcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == FleetOutcome::Succeeded
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        i32::from(!self.is_success())
    }
}

/// Result of one `deploy` run across the fleet.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub module: ModuleName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub kind: TargetKind,
    pub outcome: FleetOutcome,
    /// One record per target, in deploy order. Empty when the run aborted
    /// before any deployer was created.
    pub records: Vec<DeployRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal finalize failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FleetReport {
    #[must_use]
    pub fn new(module: ModuleName, kind: TargetKind) -> Self {
        Self {
            module,
            version: None,
            kind,
            outcome: FleetOutcome::Succeeded,
            records: Vec::new(),
            error: None,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Targets that were rolled back, in rollback order.
    pub fn rolled_back(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.rolled_back)
            .map(|r| r.target.as_str())
    }
}

// ── Remote host layout ────────────────────────────────────────────────────────

/// Directory layout of one module on a host:
/// `<root>/<module>/releases/<version>` plus a `current` symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    pub module_dir: String,
}

impl ReleaseLayout {
    #[must_use]
    pub fn new(deploy_root: &str, module: ModuleName) -> Self {
        Self {
            module_dir: format!("{}/{module}", deploy_root.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn releases_dir(&self) -> String {
        format!("{}/releases", self.module_dir)
    }

    #[must_use]
    pub fn release_dir(&self, version: &str) -> String {
        format!("{}/releases/{version}", self.module_dir)
    }

    #[must_use]
    pub fn current_link(&self) -> String {
        format!("{}/current", self.module_dir)
    }
}

/// Release names that should be deleted to keep `keep` releases, newest
/// first.
///
/// Releases are ordered by the semver of their directory names; listing
/// order and timestamps play no part. Names that are not versions are never
/// returned, nor is the current release, even outside the kept window.
#[must_use]
pub fn stale_releases(releases: &[String], keep: usize, current: Option<&str>) -> Vec<String> {
    let mut versioned: Vec<(semver::Version, &str)> = releases
        .iter()
        .map(|r| r.trim())
        .filter_map(|r| semver::Version::parse(r).ok().map(|v| (v, r)))
        .collect();
    versioned.sort_by(|a, b| b.0.cmp(&a.0));
    versioned
        .into_iter()
        .skip(keep)
        .map(|(_, r)| r)
        .filter(|r| Some(*r) != current)
        .map(str::to_owned)
        .collect()
}

/// Release name from the target of the `current` symlink.
///
/// `readlink` may return an absolute path or one relative to the module dir.
#[must_use]
pub fn release_from_link(link_target: &str) -> Option<String> {
    let trimmed = link_target.trim().trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/')?;
    if !(parent == "releases" || parent.ends_with("/releases")) || name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// Available kilobytes from `df -Pk <path>` output.
#[must_use]
pub fn parse_df_available_kb(output: &str) -> Option<u64> {
    output
        .lines()
        .nth(1)?
        .split_whitespace()
        .nth(3)?
        .parse()
        .ok()
}

/// First token of `sha256sum` output.
#[must_use]
pub fn parse_sha256sum(output: &str) -> Option<String> {
    let digest = output.split_whitespace().next()?;
    (digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_ascii_lowercase())
}

/// Quote `value` for a POSIX shell command line.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:@=+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parse an HTTP status printed by `curl -w '%{http_code}'`; `000` means no response.
#[must_use]
pub fn parse_http_code(output: &str) -> Option<u16> {
    output.trim().parse::<u16>().ok().filter(|code| *code > 0)
}

// ── Registry references ───────────────────────────────────────────────────────

/// `<registry>/<repository>:<tag>`
#[must_use]
pub fn image_reference(registry: &str, repository: &str, tag: &str) -> String {
    format!("{}/{repository}:{tag}", registry.trim_end_matches('/'))
}

/// `<registry>/<repository>@<digest>`
#[must_use]
pub fn digest_reference(registry: &str, repository: &str, digest: &str) -> String {
    format!("{}/{repository}@{digest}", registry.trim_end_matches('/'))
}

/// Digest from `docker buildx imagetools inspect --format '{{json .Manifest}}'`.
#[must_use]
pub fn parse_manifest_digest(output: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(output.trim()).ok()?;
    value
        .get("digest")?
        .as_str()
        .filter(|d| d.starts_with("sha256:"))
        .map(str::to_owned)
}

/// Image reference from `docker load` output (`Loaded image: <ref>`).
#[must_use]
pub fn parse_loaded_image(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        line.strip_prefix("Loaded image: ")
            .or_else(|| line.strip_prefix("Loaded image ID: "))
            .map(|r| r.trim().to_string())
    })
}
