//! Artifact inspection and source file reads.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::application::ports::{ArtifactFormat, ArtifactInfo, ArtifactInspector, LocalFs};

/// Production filesystem implementation of `LocalFs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl LocalFs for OsFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading file {}", path.display()))
    }
}

/// Validates artifacts on the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactInspector;

impl ArtifactInspector for FsArtifactInspector {
    fn inspect(&self, path: &Path, format: ArtifactFormat, max_bytes: u64) -> Result<ArtifactInfo> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("artifact {} not found", path.display()))?;
        anyhow::ensure!(meta.is_file(), "artifact {} is not a file", path.display());
        let size_bytes = meta.len();
        anyhow::ensure!(size_bytes > 0, "artifact {} is empty", path.display());
        anyhow::ensure!(
            size_bytes <= max_bytes,
            "artifact {} is {} MiB, limit is {} MiB",
            path.display(),
            size_bytes.div_ceil(1024 * 1024),
            max_bytes / (1024 * 1024)
        );

        match format {
            ArtifactFormat::GzipTarball => check_gzip_tarball(path)?,
            ArtifactFormat::ImageArchive => check_image_archive(path)?,
        }

        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            size_bytes,
            sha256: sha256_file(path)?,
        })
    }
}

/// At least one readable entry in a gzip-compressed tar.
fn check_gzip_tarball(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(BufReader::new(file)));
    let mut entries = archive
        .entries()
        .with_context(|| format!("{} is not a gzip tarball", path.display()))?;
    match entries.next() {
        Some(entry) => {
            entry.with_context(|| format!("{} is not a gzip tarball", path.display()))?;
            Ok(())
        }
        None => anyhow::bail!("{} is an empty tarball", path.display()),
    }
}

/// `docker save` output: a plain tar with `manifest.json` at its root.
fn check_image_archive(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = tar::Archive::new(BufReader::new(file));
    let entries = archive
        .entries()
        .with_context(|| format!("{} is not a tar archive", path.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("{} is not a tar archive", path.display()))?;
        let entry_path = entry.path().context("unreadable entry path")?;
        if entry_path.as_os_str() == "manifest.json" {
            return Ok(());
        }
    }
    anyhow::bail!("{} has no manifest.json; not a docker image archive", path.display())
}

/// Compute the SHA256 hex digest of a file.
///
/// Reads the file in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
