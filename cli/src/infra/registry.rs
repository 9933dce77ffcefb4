//! Container registry connection driven through the docker CLI.
//!
//! Each target gets a private `DOCKER_CONFIG` directory so credentials never
//! touch the user's docker config and targets cannot see each other's logins.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use shipyard_common::ConnectionState;
use tempfile::TempDir;

use crate::application::ports::{CommandRunner, Invocation, RegistryClient, TargetConnection};
use crate::domain::error::ConnectionError;
use crate::domain::release::{parse_loaded_image, parse_manifest_digest};
use crate::domain::target::RegistryTarget;

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    config_dir: Option<TempDir>,
    logged_in: bool,
    disposed: bool,
}

pub struct RegistryConnection<R> {
    target: RegistryTarget,
    host: Option<String>,
    runner: R,
    connect_timeout: Duration,
    command_timeout: Duration,
    inner: Mutex<Inner>,
}

impl<R: CommandRunner> RegistryConnection<R> {
    pub fn new(
        target: RegistryTarget,
        runner: R,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        let host = target.url.as_deref().map(registry_host_of);
        Self {
            target,
            host,
            runner,
            connect_timeout,
            command_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn config_dir(&self) -> Result<PathBuf> {
        let inner = self.lock();
        match (&inner.config_dir, inner.state) {
            (Some(dir), ConnectionState::Connected) => Ok(dir.path().to_path_buf()),
            _ => anyhow::bail!("not connected to registry '{}'", self.target.name),
        }
    }

    async fn docker_in(
        &self,
        config: &Path,
        args: &[&str],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Output> {
        let config = config.to_string_lossy();
        let envs = [("DOCKER_CONFIG", &*config)];
        let mut invocation = Invocation::new("docker", args).envs(&envs).timeout(timeout);
        if let Some(input) = stdin {
            invocation = invocation.stdin(input);
        }
        tracing::debug!(registry = %self.target.name, command = %invocation.command_line(), "docker");
        self.runner.execute(&invocation).await
    }

    /// Run docker against the live session, failing on a non-zero exit.
    async fn docker(&self, args: &[&str]) -> Result<Output> {
        let config = self.config_dir()?;
        let out = self
            .docker_in(&config, args, None, self.command_timeout)
            .await?;
        if !out.status.success() {
            anyhow::bail!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(out)
    }

    async fn open(&self) -> Result<(TempDir, bool)> {
        let host = self
            .host
            .clone()
            .context("missing url (set SHIPYARD_REGISTRY_<NAME>_URL)")?;
        let dir = tempfile::Builder::new()
            .prefix("shipyard-docker-")
            .tempdir()
            .context("cannot create docker config dir")?;

        let daemon = self
            .docker_in(
                dir.path(),
                &["version", "--format", "{{.Server.Version}}"],
                None,
                self.connect_timeout,
            )
            .await?;
        if !daemon.status.success() {
            anyhow::bail!(
                "docker daemon not reachable: {}",
                String::from_utf8_lossy(&daemon.stderr).trim()
            );
        }

        let logged_in = match (&self.target.account, &self.target.token) {
            (Some(account), Some(token)) => {
                let out = self
                    .docker_in(
                        dir.path(),
                        &["login", "--username", account.as_str(), "--password-stdin", host.as_str()],
                        Some(token.expose().as_bytes()),
                        self.connect_timeout,
                    )
                    .await?;
                if !out.status.success() {
                    anyhow::bail!(
                        "docker login to {host} failed: {}",
                        String::from_utf8_lossy(&out.stderr).trim()
                    );
                }
                true
            }
            (None, None) => false,
            (Some(_), None) => anyhow::bail!("account set without token"),
            (None, Some(_)) => anyhow::bail!("token set without account"),
        };
        Ok((dir, logged_in))
    }
}

impl<R: CommandRunner> TargetConnection for RegistryConnection<R> {
    fn target_name(&self) -> &str {
        &self.target.name
    }

    fn state(&self) -> ConnectionState {
        self.lock().state
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(ConnectionError::new(&self.target.name, "connection already disposed"));
            }
            if inner.state != ConnectionState::Disconnected {
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }
        match self.open().await {
            Ok((dir, logged_in)) => {
                tracing::debug!(registry = %self.target.name, logged_in, "registry session ready");
                let mut inner = self.lock();
                inner.config_dir = Some(dir);
                inner.logged_in = logged_in;
                inner.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.lock().state = ConnectionState::Disconnected;
                Err(ConnectionError::new(&self.target.name, format!("{e:#}")))
            }
        }
    }

    async fn dispose(&self) {
        let (dir, logged_in) = {
            let mut inner = self.lock();
            inner.disposed = true;
            inner.state = ConnectionState::Disconnected;
            (inner.config_dir.take(), std::mem::take(&mut inner.logged_in))
        };
        let (Some(dir), true, Some(host)) = (dir, logged_in, self.host.as_deref()) else {
            return;
        };
        if let Err(e) = self
            .docker_in(dir.path(), &["logout", host], None, self.connect_timeout)
            .await
        {
            tracing::warn!(registry = %self.target.name, error = %e, "docker logout failed");
        }
    }
}

impl<R: CommandRunner> RegistryClient for RegistryConnection<R> {
    fn registry_host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn health_url(&self) -> Option<&str> {
        self.target.health_url.as_deref()
    }

    async fn load_archive(&self, archive: &Path) -> Result<String> {
        let path = archive.to_string_lossy();
        let out = self.docker(&["load", "--input", &*path]).await?;
        parse_loaded_image(&String::from_utf8_lossy(&out.stdout))
            .context("docker load printed no image reference")
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.docker(&["tag", source, target]).await.map(drop)
    }

    async fn push(&self, reference: &str) -> Result<()> {
        self.docker(&["push", reference]).await.map(drop)
    }

    async fn remote_digest(&self, reference: &str) -> Result<Option<String>> {
        let config = self.config_dir()?;
        let out = self
            .docker_in(
                &config,
                &["buildx", "imagetools", "inspect", reference, "--format", "{{json .Manifest}}"],
                None,
                self.command_timeout,
            )
            .await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if is_missing_manifest(&stderr) {
                return Ok(None);
            }
            anyhow::bail!("cannot inspect {reference}: {}", stderr.trim());
        }
        parse_manifest_digest(&String::from_utf8_lossy(&out.stdout))
            .map(Some)
            .with_context(|| format!("no digest in manifest of {reference}"))
    }

    async fn retag_remote(&self, source: &str, target: &str) -> Result<()> {
        self.docker(&["buildx", "imagetools", "create", "--tag", target, source])
            .await
            .map(drop)
    }

    async fn remove_local(&self, reference: &str) -> Result<()> {
        let config = self.config_dir()?;
        let out = self
            .docker_in(&config, &["image", "rm", reference], None, self.command_timeout)
            .await?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() && !stderr.contains("No such image") {
            anyhow::bail!("cannot remove {reference}: {}", stderr.trim());
        }
        Ok(())
    }
}

/// Registry host from a configured URL: scheme and trailing slash dropped.
fn registry_host_of(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Whether `imagetools inspect` failed because the reference does not exist.
fn is_missing_manifest(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    ["not found", "manifest unknown", "name unknown"]
        .iter()
        .any(|needle| lower.contains(needle))
}
