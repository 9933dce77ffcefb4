//! Registry target: load a `docker save` archive, tag and push it.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use shipyard_common::TargetKind;

use crate::application::ports::{ArtifactFormat, ArtifactInspector, HttpProbe, RegistryClient};
use crate::application::services::artifact::CachedInspector;
use crate::application::services::deployer::{DeployContext, DeployStrategy};
use crate::application::services::health::{PollPolicy, poll_until_healthy};
use crate::domain::HealthStatus;
use crate::domain::module::ModuleSpec;
use crate::domain::release::{digest_reference, image_reference};
use crate::domain::version;

const LATEST: &str = "latest";

/// Per-request timeout for the public health endpoint.
const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RegistryPushStrategy<I, H> {
    inspector: CachedInspector<I>,
    probe: H,
    repo_root: PathBuf,
    artifact_override: Option<PathBuf>,
}

impl<I: ArtifactInspector, H: HttpProbe> RegistryPushStrategy<I, H> {
    pub fn new(inspector: I, probe: H, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            inspector: CachedInspector::new(inspector),
            probe,
            repo_root: repo_root.into(),
            artifact_override: None,
        }
    }

    /// Ship this pre-built archive instead of the default build output.
    #[must_use]
    pub fn with_artifact_override(mut self, path: Option<PathBuf>) -> Self {
        self.artifact_override = path;
        self
    }

    async fn manifest_status<C: RegistryClient>(&self, conn: &C, reference: &str) -> HealthStatus {
        match conn.remote_digest(reference).await {
            Ok(Some(_)) => HealthStatus::Healthy,
            Ok(None) => HealthStatus::Pending(format!("{reference} not visible yet")),
            Err(e) => HealthStatus::from_registry_error(&format!("{e:#}")),
        }
    }

    async fn http_status(&self, url: &str) -> HealthStatus {
        match self.probe.get_status(url, HEALTH_REQUEST_TIMEOUT).await {
            Ok(code) => HealthStatus::from_http_status(code),
            Err(e) => HealthStatus::Pending(format!("{e:#}")),
        }
    }
}

fn registry_of<C: RegistryClient>(conn: &C) -> Result<&str> {
    conn.registry_host().context("registry target has no url")
}

/// Docker tag carrying the deployed version.
fn version_tag(ctx: &DeployContext) -> Result<String> {
    version::docker_tag(&ctx.version)
        .with_context(|| format!("version '{}' cannot be used as a docker tag", ctx.version))
}

impl<C, I, H> DeployStrategy<C> for RegistryPushStrategy<I, H>
where
    C: RegistryClient,
    I: ArtifactInspector,
    H: HttpProbe,
{
    fn kind(&self) -> TargetKind {
        TargetKind::Registry
    }

    fn artifact_path(&self, module: &ModuleSpec, version: &str) -> PathBuf {
        self.artifact_override.clone().unwrap_or_else(|| {
            module.default_artifact_path(&self.repo_root, TargetKind::Registry, version)
        })
    }

    async fn check_preconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        registry_of(conn)?;
        version_tag(ctx)?;
        self.inspector.inspect(
            &ctx.artifact,
            ArtifactFormat::ImageArchive,
            ctx.settings.max_artifact_bytes(),
        )?;
        Ok(())
    }

    async fn snapshot(&self, conn: &C, ctx: &DeployContext) -> Result<Option<String>> {
        let latest = image_reference(registry_of(conn)?, ctx.module.image_repository, LATEST);
        conn.remote_digest(&latest)
            .await
            .with_context(|| format!("cannot inspect {latest}"))
    }

    async fn core_deploy(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let registry = registry_of(conn)?;
        let loaded = conn
            .load_archive(&ctx.artifact)
            .await
            .with_context(|| format!("cannot load {}", ctx.artifact.display()))?;
        let pushed_tag = version_tag(ctx)?;
        for tag in [pushed_tag.as_str(), LATEST] {
            let reference = image_reference(registry, ctx.module.image_repository, tag);
            conn.tag(&loaded, &reference).await?;
            conn.push(&reference)
                .await
                .with_context(|| format!("push of {reference} failed"))?;
            tracing::info!(reference = %reference, "pushed");
        }
        Ok(())
    }

    async fn check_postconditions(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let policy = PollPolicy::new(
            Duration::from_secs(ctx.settings.health_timeout_secs),
            Duration::from_secs(ctx.settings.health_interval_secs),
        );
        let pushed = image_reference(registry_of(conn)?, ctx.module.image_repository, &version_tag(ctx)?);
        poll_until_healthy(&pushed, policy, || self.manifest_status(conn, &pushed)).await?;

        if let Some(url) = conn.health_url() {
            poll_until_healthy(url, policy, || self.http_status(url)).await?;
        }
        Ok(())
    }

    async fn rollback(&self, conn: &C, ctx: &DeployContext, previous: Option<&str>) -> Result<()> {
        let registry = registry_of(conn)?;
        let Some(digest) = previous else {
            tracing::warn!(
                repository = ctx.module.image_repository,
                "no previous image, nothing to restore"
            );
            return Ok(());
        };
        let source = digest_reference(registry, ctx.module.image_repository, digest);
        let latest = image_reference(registry, ctx.module.image_repository, LATEST);
        conn.retag_remote(&source, &latest)
            .await
            .with_context(|| format!("cannot point {latest} back at {digest}"))
    }

    async fn finalize(&self, conn: &C, ctx: &DeployContext) -> Result<()> {
        let registry = registry_of(conn)?;
        let pushed_tag = version_tag(ctx)?;
        for tag in [pushed_tag.as_str(), LATEST] {
            conn.remove_local(&image_reference(registry, ctx.module.image_repository, tag))
                .await?;
        }
        Ok(())
    }
}
