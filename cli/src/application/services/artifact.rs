//! Artifact inspection shared by the deploy strategies.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::application::ports::{ArtifactFormat, ArtifactInfo, ArtifactInspector};

/// Inspects an artifact once per run and reuses the result.
///
/// Every target of a fleet receives the same file, so hashing it again for
/// each target only costs time.
pub struct CachedInspector<I> {
    inner: I,
    last: Mutex<Option<(ArtifactFormat, ArtifactInfo)>>,
}

impl<I: ArtifactInspector> CachedInspector<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl<I: ArtifactInspector> ArtifactInspector for CachedInspector<I> {
    fn inspect(&self, path: &Path, format: ArtifactFormat, max_bytes: u64) -> Result<ArtifactInfo> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow!("artifact cache lock poisoned"))?;
        if let Some((cached_format, info)) = last.as_ref()
            && *cached_format == format
            && info.path == path
            && info.size_bytes <= max_bytes
        {
            return Ok(info.clone());
        }
        let info = self.inner.inspect(path, format, max_bytes)?;
        tracing::info!(
            artifact = %info.path.display(),
            size_bytes = info.size_bytes,
            sha256 = %info.sha256,
            "artifact inspected"
        );
        *last = Some((format, info.clone()));
        Ok(info)
    }
}
