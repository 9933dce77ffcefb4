//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use shipyard_common::ConnectionState;

use crate::domain::ConnectionError;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// A single process invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [&'a str],
    /// Working directory; inherits the caller's when `None`.
    pub cwd: Option<&'a Path>,
    /// Extra environment variables for the child only.
    pub envs: &'a [(&'a str, &'a str)],
    /// Bytes piped to the child's stdin.
    pub stdin: Option<&'a [u8]>,
    /// Overrides the runner's default timeout.
    pub timeout: Option<Duration>,
}

impl<'a> Invocation<'a> {
    #[must_use]
    pub fn new(program: &'a str, args: &'a [&'a str]) -> Self {
        Self {
            program,
            args,
            cwd: None,
            envs: &[],
            stdin: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn cwd(mut self, cwd: &'a Path) -> Self {
        self.cwd = Some(cwd);
        self
    }

    #[must_use]
    pub fn envs(mut self, envs: &'a [(&'a str, &'a str)]) -> Self {
        self.envs = envs;
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2 …` for logs and error messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run an invocation and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds its
    /// timeout. On timeout, the child process must be killed (not left
    /// orphaned). A non-zero exit is NOT an error at this level.
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit a failure message. Never suppressed by quiet mode.
    fn error(&self, message: &str);
}

// ── Connection Ports ──────────────────────────────────────────────────────────

/// A live channel to one deployment target.
///
/// A connection belongs to exactly one target for its whole life. Methods
/// take `&self`; implementations keep their state behind interior
/// mutability so deployers can share the pool's connections by reference.
#[allow(async_fn_in_trait)]
pub trait TargetConnection {
    /// Name of the target this connection is bound to.
    fn target_name(&self) -> &str;

    /// Current channel state.
    fn state(&self) -> ConnectionState;

    /// Establish the channel. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns a `ConnectionError` naming the target when the channel cannot
    /// be established (missing credentials, unreachable host, timeout).
    async fn connect(&self) -> std::result::Result<(), ConnectionError>;

    /// Tear the channel down. Safe to call repeatedly, and before a
    /// successful `connect()`.
    async fn dispose(&self);
}

/// Remote-shell primitives for host targets.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run a shell command line on the remote host and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout. A non-zero remote
    /// exit status is returned in the `Output`, not as an error.
    async fn exec(&self, command: &str) -> Result<Output>;

    /// Copy a local file to `remote_path` on the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or times out.
    async fn upload(&self, local: &Path, remote_path: &str) -> Result<()>;
}

/// Container registry primitives for registry targets.
#[allow(async_fn_in_trait)]
pub trait RegistryClient {
    /// Registry host, e.g. `123456789012.dkr.ecr.il-central-1.amazonaws.com`.
    fn registry_host(&self) -> Option<&str>;

    /// Public health endpoint of the service fed from this registry, if any.
    fn health_url(&self) -> Option<&str>;

    /// Load an image archive into the local image store; returns the loaded reference.
    async fn load_archive(&self, archive: &Path) -> Result<String>;

    /// Tag a local image.
    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Push a tagged image.
    async fn push(&self, reference: &str) -> Result<()>;

    /// Digest of a remote reference, `None` when it does not exist.
    async fn remote_digest(&self, reference: &str) -> Result<Option<String>>;

    /// Point the remote tag `target` at the manifest `source` (by digest) without pulling.
    async fn retag_remote(&self, source: &str, target: &str) -> Result<()>;

    /// Remove a local image tag.
    async fn remove_local(&self, reference: &str) -> Result<()>;
}

// ── Artifact and Filesystem Ports ─────────────────────────────────────────────

/// Archive layout an artifact must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// gzip-compressed tarball with at least one entry.
    GzipTarball,
    /// `docker save` archive: plain tar containing `manifest.json`.
    ImageArchive,
}

/// Facts about a validated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Abstracts artifact inspection so precondition checks can be mocked.
pub trait ArtifactInspector {
    /// Validate the artifact at `path` and return its size and digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, empty, larger than
    /// `max_bytes`, or not a well-formed archive of the given format.
    fn inspect(&self, path: &Path, format: ArtifactFormat, max_bytes: u64) -> Result<ArtifactInfo>;
}

/// Abstracts reading local source files (version manifests).
pub trait LocalFs {
    /// Read a UTF-8 file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

// ── Health Port ───────────────────────────────────────────────────────────────

/// Abstracts HTTP health endpoints so postconditions can be tested offline.
#[allow(async_fn_in_trait)]
pub trait HttpProbe {
    /// GET `url` and return the HTTP status code.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or timeout.
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16>;
}
