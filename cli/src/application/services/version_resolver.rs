//! Version resolution with a per-run cache.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use shipyard_common::ModuleName;
use tokio::sync::RwLock;

use crate::application::ports::{CommandRunner, Invocation, LocalFs};
use crate::domain::error::ResolutionError;
use crate::domain::module::ModuleSpec;
use crate::domain::version;

/// Default timeout for native version commands (`cargo make` may compile).
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Computes each module's version at most once per run.
///
/// The first `get_version` call for a module either takes the override or
/// runs the module's native version command, falling back to parsing its
/// version file. The result is cached; later calls never re-run the command.
pub struct VersionResolver<R, F> {
    runner: R,
    fs: F,
    repo_root: PathBuf,
    override_version: Option<String>,
    timeout: Duration,
    cache: RwLock<HashMap<ModuleName, String>>,
    released: RwLock<HashMap<ModuleName, Option<String>>>,
}

impl<R: CommandRunner, F: LocalFs> VersionResolver<R, F> {
    pub fn new(runner: R, fs: F, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            fs,
            repo_root: repo_root.into(),
            override_version: None,
            timeout: DEFAULT_VERSION_TIMEOUT,
            cache: RwLock::new(HashMap::new()),
            released: RwLock::new(HashMap::new()),
        }
    }

    /// Use `version` instead of computing one.
    #[must_use]
    pub fn with_override(mut self, version: Option<String>) -> Self {
        self.override_version = version;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the version of `module`, computing it on first use only.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` if the override is not semver, or if neither
    /// the native command nor the version file yields a semver version.
    pub async fn get_version(&self, module: &ModuleSpec) -> Result<String, ResolutionError> {
        if let Some(hit) = self.cache.read().await.get(&module.name) {
            tracing::debug!(module = %module.name, version = %hit, "version cache hit");
            return Ok(hit.clone());
        }

        // Holding the write lock across resolution keeps concurrent first
        // callers from running the command twice.
        let mut cache = self.cache.write().await;
        if let Some(hit) = cache.get(&module.name) {
            return Ok(hit.clone());
        }
        let resolved = self.resolve(module).await?;
        tracing::info!(module = %module.name, version = %resolved, "version resolved");
        cache.insert(module.name, resolved.clone());
        Ok(resolved)
    }

    /// Latest released version of `module`, read from the repository's
    /// `<tag_prefix>*` git tags. Looked up once per run.
    ///
    /// `None` when no release tag exists or git cannot list tags.
    pub async fn released_version(&self, module: &ModuleSpec) -> Option<String> {
        if let Some(hit) = self.released.read().await.get(&module.name) {
            return hit.clone();
        }
        let mut released = self.released.write().await;
        if let Some(hit) = released.get(&module.name) {
            return hit.clone();
        }
        let found = self.from_release_tags(module).await;
        released.insert(module.name, found.clone());
        found
    }

    /// Refuse a computed version that does not move past the last release.
    ///
    /// Skipped when an override is set. Passes when nothing was released yet.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` if the version cannot be resolved, is not
    /// strictly greater than the released version, or cannot be compared.
    pub async fn ensure_newer_than_released(&self, module: &ModuleSpec) -> Result<(), ResolutionError> {
        if self.override_version.is_some() {
            tracing::debug!(module = %module.name, "version override set, skipping release baseline check");
            return Ok(());
        }
        let current = self.get_version(module).await?;
        let Some(released) = self.released_version(module).await else {
            tracing::info!(module = %module.name, version = %current, "no previous release");
            return Ok(());
        };
        match version::is_newer(&current, &released) {
            Ok(true) => {
                tracing::info!(module = %module.name, version = %current, %released, "version is ahead of release");
                Ok(())
            }
            Ok(false) => Err(ResolutionError::NotNewerThanReleased {
                module: module.name,
                version: current,
                released,
                file: module.version_file.to_string(),
            }),
            Err(reason) => Err(ResolutionError::Incomparable {
                module: module.name,
                tag: module.tag(&released),
                reason,
            }),
        }
    }

    /// Cached version of `module`, if already resolved.
    pub async fn cached(&self, module: ModuleName) -> Option<String> {
        self.cache.read().await.get(&module).cloned()
    }

    /// Every cached entry, ordered by module.
    pub async fn cache_snapshot(&self) -> BTreeMap<ModuleName, String> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    async fn resolve(&self, module: &ModuleSpec) -> Result<String, ResolutionError> {
        if let Some(value) = &self.override_version {
            version::validate(value).map_err(|reason| ResolutionError::InvalidOverride {
                value: value.clone(),
                reason,
            })?;
            return Ok(value.clone());
        }

        let command_error = match self.from_native_command(module).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        tracing::warn!(
            module = %module.name,
            command = %module.native_command_line(),
            error = %command_error,
            "native version command failed, falling back to version file"
        );

        self.from_version_file(module)
            .map_err(|file_error| ResolutionError::Unresolvable {
                module: module.name,
                command: module.native_command_line(),
                command_error,
                file: module.version_file.to_string(),
                file_error,
            })
    }

    async fn from_native_command(&self, module: &ModuleSpec) -> Result<String, String> {
        let Some((program, args)) = module.native_command.split_first() else {
            return Err("no native command configured".to_string());
        };
        let cwd = self.repo_root.join(module.path);
        let output = self
            .runner
            .execute(
                &Invocation::new(program, args)
                    .cwd(&cwd)
                    .timeout(self.timeout),
            )
            .await
            .map_err(|e| format!("{e:#}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("exited with {}: {}", output.status, stderr.trim()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = version::clean_native_output(&stdout).ok_or("printed no version")?;
        version::validate(&found).map_err(|e| format!("printed '{found}': {e}"))?;
        Ok(found)
    }

    async fn from_release_tags(&self, module: &ModuleSpec) -> Option<String> {
        let pattern = format!("{}*", module.tag_prefix);
        let args = ["tag", "-l", pattern.as_str(), "--sort=-v:refname"];
        let result = self
            .runner
            .execute(
                &Invocation::new("git", &args)
                    .cwd(&self.repo_root)
                    .timeout(self.timeout),
            )
            .await;
        match result {
            Ok(output) if output.status.success() => {
                version::latest_released(&String::from_utf8_lossy(&output.stdout), module.tag_prefix)
            }
            Ok(output) => {
                tracing::warn!(
                    module = %module.name,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "cannot list release tags"
                );
                None
            }
            Err(e) => {
                tracing::warn!(module = %module.name, error = %format!("{e:#}"), "cannot list release tags");
                None
            }
        }
    }

    fn from_version_file(&self, module: &ModuleSpec) -> Result<String, String> {
        let path = self.repo_root.join(module.version_file);
        let content = self.fs.read_to_string(&path).map_err(|e| format!("{e:#}"))?;
        let found = version::extract_from_file(module.version_format, &content)
            .ok_or_else(|| format!("no version field in {}", path.display()))?;
        version::validate(&found).map_err(|e| format!("malformed version '{found}': {e}"))?;
        Ok(found)
    }
}
