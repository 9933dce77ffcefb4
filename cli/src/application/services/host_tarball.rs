//! Host target: ship a release tarball over SSH and restart the unit.
//!
//! Remote layout: `<deploy_root>/<module>/releases/<version>` plus a
//! `current` symlink swapped atomically on activation.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use shipyard_common::TargetKind;

use crate::application::ports::{ArtifactFormat, ArtifactInspector, RemoteShell};
use crate::application::services::artifact::CachedInspector;
use crate::application::services::deployer::{DeployContext, DeployStrategy};
use crate::application::services::health::{PollPolicy, poll_until_healthy};
use crate::domain::HealthStatus;
use crate::domain::module::ModuleSpec;
use crate::domain::release::{
    ReleaseLayout, parse_df_available_kb, parse_http_code, parse_sha256sum, release_from_link,
    shell_quote, stale_releases,
};

/// Free space required on the host, as a multiple of the artifact size
/// (upload plus extracted release).
const FREE_SPACE_FACTOR: u64 = 2;

/// Per-request timeout of the in-host health check.
const CURL_MAX_TIME_SECS: u64 = 5;

pub struct HostTarballStrategy<I> {
    inspector: CachedInspector<I>,
    repo_root: PathBuf,
}

impl<I: ArtifactInspector> HostTarballStrategy<I> {
    pub fn new(inspector: I, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            inspector: CachedInspector::new(inspector),
            repo_root: repo_root.into(),
        }
    }

    async fn probe<C: RemoteShell>(&self, conn: &C, ctx: &DeployContext) -> HealthStatus {
        let unit = ctx.module.service_unit;
        let state = match conn.exec(&format!("systemctl is-active {}", shell_quote(unit))).await {
            Ok(out) => String::from_utf8_lossy(&out.stdout).trim().to_string(),
            Err(e) => return HealthStatus::Pending(format!("{e:#}")),
        };
        match state.as_str() {
            "active" => {}
            "failed" => return HealthStatus::Unhealthy(format!("unit {unit} failed")),
            other => return HealthStatus::Pending(format!("unit {unit} is {other}")),
        }

        let url = format!(
            "http://127.0.0.1:{}{}",
            ctx.module.health_port, ctx.module.health_path
        );
        let cmd = format!(
            "curl -sS -o /dev/null -w '%{{http_code}}' --max-time {CURL_MAX_TIME_SECS} {}",
            shell_quote(&url)
        );
        match conn.exec(&cmd).await {
            Ok(out) => match parse_http_code(&String::from_utf8_lossy(&out.stdout)) {
                Some(code) => HealthStatus::from_http_status(code),
                None => HealthStatus::Pending(format!("{url} not answering")),
            },
            Err(e) => HealthStatus::Pending(format!("{e:#}")),
        }
    }
}

/// Run `command` remotely, failing on a non-zero exit. Returns stdout.
async fn remote(conn: &impl RemoteShell, command: &str) -> Result<String> {
    let out = conn
        .exec(command)
        .await
        .with_context(|| format!("remote command failed: {command}"))?;
    if !out.status.success() {
        anyhow::bail!(
            "remote command '{command}' exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Point `current` at `release` by renaming a fresh symlink over it.
fn swap_current_command(layout: &ReleaseLayout, release: &str) -> String {
    let current = layout.current_link();
    let staged = format!("{current}.next");
    format!(
        "ln -sfn {} {} && mv -Tf {} {}",
        shell_quote(release),
        shell_quote(&staged),
        shell_quote(&staged),
        shell_quote(&current)
    )
}

fn upload_path(ctx: &DeployContext) -> String {
    format!("/tmp/shipyard-{}-{}.tar.gz", ctx.module.name, ctx.version)
}

impl<C, I> DeployStrategy<C> for HostTarballStrategy<I>
where
    C: RemoteShell,
    I: ArtifactInspector,
{
    fn kind(&self) -> TargetKind {
        TargetKind::Host
    }

    fn artifact_path(&self, module: &ModuleSpec, version: &str) -> PathBuf {
        module.default_artifact_path(&self.repo_root, TargetKind::Host, version)
    }

    async fn check_preconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let info = self.inspector.inspect(
            &ctx.artifact,
            ArtifactFormat::GzipTarball,
            ctx.settings.max_artifact_bytes(),
        )?;

        let root = shell_quote(&ctx.settings.deploy_root);
        let df = remote(conn, &format!("df -Pk {root} 2>/dev/null || df -Pk /tmp")).await?;
        let available_kb = parse_df_available_kb(&df)
            .with_context(|| format!("unexpected df output: {}", df.trim()))?;
        let required = info.size_bytes.saturating_mul(FREE_SPACE_FACTOR);
        if available_kb.saturating_mul(1024) < required {
            anyhow::bail!(
                "not enough free space: {} KiB available, {} KiB required",
                available_kb,
                required.div_ceil(1024)
            );
        }
        Ok(())
    }

    async fn snapshot(&self, conn: &C, ctx: &DeployContext) -> Result<Option<String>> {
        let layout = ReleaseLayout::new(&ctx.settings.deploy_root, ctx.module.name);
        let out = conn
            .exec(&format!("readlink {}", shell_quote(&layout.current_link())))
            .await
            .context("cannot read current release")?;
        // readlink exits non-zero when there is no `current` link yet.
        if !out.status.success() {
            return Ok(None);
        }
        Ok(release_from_link(&String::from_utf8_lossy(&out.stdout)))
    }

    async fn core_deploy(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let info = self.inspector.inspect(
            &ctx.artifact,
            ArtifactFormat::GzipTarball,
            ctx.settings.max_artifact_bytes(),
        )?;
        let layout = ReleaseLayout::new(&ctx.settings.deploy_root, ctx.module.name);
        let release = layout.release_dir(&ctx.version);
        let upload = upload_path(ctx);

        remote(conn, &format!("mkdir -p {}", shell_quote(&release))).await?;
        conn.upload(&ctx.artifact, &upload)
            .await
            .with_context(|| format!("upload of {} failed", ctx.artifact.display()))?;

        let sum = remote(conn, &format!("sha256sum {}", shell_quote(&upload))).await?;
        let remote_sha = parse_sha256sum(&sum).context("unexpected sha256sum output")?;
        if remote_sha != info.sha256 {
            let _ = conn.exec(&format!("rm -f {}", shell_quote(&upload))).await;
            anyhow::bail!(
                "checksum mismatch after upload: local {}, remote {remote_sha}",
                info.sha256
            );
        }

        remote(
            conn,
            &format!("tar -xzf {} -C {}", shell_quote(&upload), shell_quote(&release)),
        )
        .await?;
        remote(conn, &swap_current_command(&layout, &release)).await?;
        remote(conn, &format!("rm -f {}", shell_quote(&upload))).await?;
        remote(
            conn,
            &format!("sudo systemctl restart {}", shell_quote(ctx.module.service_unit)),
        )
        .await?;
        tracing::info!(release = %release, unit = ctx.module.service_unit, "release activated");
        Ok(())
    }

    async fn check_postconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let policy = PollPolicy::new(
            Duration::from_secs(ctx.settings.health_timeout_secs),
            Duration::from_secs(ctx.settings.health_interval_secs),
        );
        poll_until_healthy(ctx.module.service_unit, policy, || self.probe(conn, ctx)).await
    }

    async fn rollback(&self, conn: &C, ctx: &DeployContext, previous: Option<&str>) -> Result<()> {
        let layout = ReleaseLayout::new(&ctx.settings.deploy_root, ctx.module.name);
        let unit = shell_quote(ctx.module.service_unit);

        let restored = match previous {
            Some(prev) => {
                let prev_dir = layout.release_dir(prev);
                match remote(conn, &swap_current_command(&layout, &prev_dir)).await {
                    Ok(_) => remote(conn, &format!("sudo systemctl restart {unit}")).await,
                    Err(e) => Err(e),
                }
            }
            None => {
                let current = shell_quote(&layout.current_link());
                remote(
                    conn,
                    &format!("sudo systemctl stop {unit}; rm -f {current}"),
                )
                .await
            }
        };

        // The new release directory goes either way, unless it is also the
        // one being restored.
        let cleanup = if previous == Some(ctx.version.as_str()) {
            Ok(String::new())
        } else {
            let release = shell_quote(&layout.release_dir(&ctx.version));
            let upload = shell_quote(&upload_path(ctx));
            remote(conn, &format!("rm -rf {release} {upload}")).await
        };

        restored.context("cannot restore previous release")?;
        cleanup.context("cannot remove new release directory")?;
        Ok(())
    }

    async fn finalize(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let layout = ReleaseLayout::new(&ctx.settings.deploy_root, ctx.module.name);
        let listing = remote(
            conn,
            &format!("ls -1 {}", shell_quote(&layout.releases_dir())),
        )
        .await?;
        let releases: Vec<String> = listing.lines().map(|l| l.trim().to_string()).collect();
        let current = <Self as DeployStrategy<C>>::snapshot(self, conn, ctx).await?;
        let stale = stale_releases(&releases, ctx.settings.keep_releases, current.as_deref());
        if stale.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = stale
            .iter()
            .map(|r| shell_quote(&layout.release_dir(r)))
            .collect();
        remote(conn, &format!("rm -rf {}", paths.join(" "))).await?;
        tracing::info!(pruned = ?stale, "stale releases removed");
        Ok(())
    }
}
