//! Shared mock infrastructure for unit tests.
//!
//! Every mock that takes part in a fleet run writes into one shared
//! [`EventLog`], so tests can assert on the global order of connects,
//! deploy steps, rollbacks and disposals.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use shipyard_cli::application::ports::{
    ArtifactFormat, ArtifactInfo, ArtifactInspector, CommandRunner, HttpProbe, Invocation,
    LocalFs, ProgressReporter, RegistryClient, RemoteShell, TargetConnection,
};
use shipyard_cli::application::services::{DeployContext, DeployStrategy};
use shipyard_cli::domain::module::ModuleSpec;
use shipyard_cli::domain::{ConnectionError, module_spec};
use shipyard_common::{ConnectionState, FleetSettings, ModuleName, TargetKind};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Settings with a one-second health budget so polling tests stay fast.
pub fn fast_settings() -> FleetSettings {
    FleetSettings {
        deploy_root: "/srv/shipyard".to_string(),
        health_timeout_secs: 1,
        health_interval_secs: 1,
        ..FleetSettings::default()
    }
}

pub fn deploy_ctx(module: ModuleName, target: &str, version: &str) -> DeployContext {
    DeployContext {
        module: module_spec(module),
        version: version.to_string(),
        target: target.to_string(),
        artifact: PathBuf::from(format!("/artifacts/{module}-{version}.tar.gz")),
        settings: fast_settings(),
    }
}

// ── Output helpers ────────────────────────────────────────────────────────────

/// Build an `ExitStatus` from a logical exit code.
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(code: i32, stderr: &[u8]) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Event log ─────────────────────────────────────────────────────────────────

/// Ordered, shared record of everything the mocks were asked to do.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events starting with `prefix`, in order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.all().iter().position(|e| e == event)
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Target connection that records connects and disposals.
pub struct MockConnection {
    name: String,
    log: EventLog,
    fail_connect: bool,
    state: Mutex<ConnectionState>,
    dispose_count: AtomicUsize,
}

impl MockConnection {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_connect: false,
            state: Mutex::new(ConnectionState::Disconnected),
            dispose_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn dispose_count(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl TargetConnection for MockConnection {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        self.log.push(format!("connect:{}", self.name));
        if self.fail_connect {
            return Err(ConnectionError::new(&self.name, "connection refused"));
        }
        *self.state.lock().unwrap() = ConnectionState::Connected;
        Ok(())
    }

    async fn dispose(&self) {
        self.log.push(format!("dispose:{}", self.name));
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
    }
}

// ── Strategy ──────────────────────────────────────────────────────────────────

/// Step of the deploy lifecycle a [`MockStrategy`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Pre,
    Snapshot,
    Deploy,
    Post,
    Rollback,
    Finalize,
}

impl Step {
    fn label(self) -> &'static str {
        match self {
            Step::Pre => "pre",
            Step::Snapshot => "snapshot",
            Step::Deploy => "deploy",
            Step::Post => "post",
            Step::Rollback => "rollback",
            Step::Finalize => "finalize",
        }
    }
}

/// Strategy that records each step as `<step>:<target>` and fails on demand.
pub struct MockStrategy {
    log: EventLog,
    failures: HashSet<(String, Step)>,
    previous: HashMap<String, String>,
    pub artifact_versions: Mutex<Vec<String>>,
}

impl MockStrategy {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            failures: HashSet::new(),
            previous: HashMap::new(),
            artifact_versions: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn fail(mut self, target: &str, step: Step) -> Self {
        self.failures.insert((target.to_string(), step));
        self
    }

    /// Make `snapshot` on `target` report `version` as last-known-good.
    #[must_use]
    pub fn previous(mut self, target: &str, version: &str) -> Self {
        self.previous.insert(target.to_string(), version.to_string());
        self
    }

    fn record(&self, step: Step, ctx: &DeployContext) -> Result<()> {
        self.log.push(format!("{}:{}", step.label(), ctx.target));
        if self.failures.contains(&(ctx.target.clone(), step)) {
            anyhow::bail!("{} failed on {}", step.label(), ctx.target);
        }
        Ok(())
    }
}

impl DeployStrategy<MockConnection> for MockStrategy {
    fn kind(&self) -> TargetKind {
        TargetKind::Host
    }

    fn artifact_path(&self, module: &ModuleSpec, version: &str) -> PathBuf {
        self.artifact_versions
            .lock()
            .unwrap()
            .push(version.to_string());
        PathBuf::from(format!("/artifacts/{}-{version}.tar.gz", module.name))
    }

    async fn check_preconditions(&self, _: &MockConnection, ctx: &DeployContext) -> Result<()> {
        self.record(Step::Pre, ctx)
    }

    async fn snapshot(&self, _: &MockConnection, ctx: &DeployContext) -> Result<Option<String>> {
        self.record(Step::Snapshot, ctx)?;
        Ok(self.previous.get(&ctx.target).cloned())
    }

    async fn core_deploy(&self, _: &MockConnection, ctx: &DeployContext) -> Result<()> {
        self.record(Step::Deploy, ctx)
    }

    async fn check_postconditions(&self, _: &MockConnection, ctx: &DeployContext) -> Result<()> {
        self.record(Step::Post, ctx)
    }

    async fn rollback(&self, _: &MockConnection, ctx: &DeployContext, previous: Option<&str>) -> Result<()> {
        self.log.push(format!(
            "rollback:{}:{}",
            ctx.target,
            previous.unwrap_or("none")
        ));
        if self.failures.contains(&(ctx.target.clone(), Step::Rollback)) {
            anyhow::bail!("rollback failed on {}", ctx.target);
        }
        Ok(())
    }

    async fn finalize(&self, _: &MockConnection, ctx: &DeployContext) -> Result<()> {
        self.record(Step::Finalize, ctx)
    }
}

// ── Command runner ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RunnerState {
    responses: Mutex<VecDeque<Result<Output, String>>>,
    calls: Mutex<Vec<String>>,
    cwds: Mutex<Vec<Option<PathBuf>>>,
}

/// Command runner returning canned outputs and recording every invocation.
///
/// Clones share state, so a test can keep a handle after moving the runner
/// into a service.
#[derive(Clone, Default)]
pub struct ScriptedRunner(Arc<RunnerState>);

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response; once the queue is empty every call fails to spawn.
    #[must_use]
    pub fn then(self, response: Output) -> Self {
        self.0.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn then_spawn_error(self, message: &str) -> Self {
        self.0
            .responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.0.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.calls.lock().unwrap().clone()
    }

    pub fn cwds(&self) -> Vec<Option<PathBuf>> {
        self.0.cwds.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<Output> {
        self.0.calls.lock().unwrap().push(invocation.command_line());
        self.0
            .cwds
            .lock()
            .unwrap()
            .push(invocation.cwd.map(Path::to_path_buf));
        let next = self.0.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(out)) => Ok(out),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Err(anyhow::anyhow!("{}: not found", invocation.program)),
        }
    }
}

// ── Local filesystem ──────────────────────────────────────────────────────────

/// In-memory `LocalFs`.
#[derive(Clone, Default)]
pub struct MapFs {
    files: HashMap<PathBuf, String>,
    reads: Arc<AtomicUsize>,
}

impl MapFs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.files.insert(path.into(), content.to_string());
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl LocalFs for MapFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("reading file {}: not found", path.display()))
    }
}

// ── Progress reporter ─────────────────────────────────────────────────────────

/// Reporter that keeps every line, prefixed by its level.
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("step {message}"));
    }
    fn success(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ok {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn {message}"));
    }
    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error {message}"));
    }
}

// ── Artifact inspector ────────────────────────────────────────────────────────

/// Inspector that accepts every artifact with a fixed size and digest.
#[derive(Clone)]
pub struct FixedInspector {
    pub size_bytes: u64,
    pub sha256: String,
    pub fail: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FixedInspector {
    pub fn new(size_bytes: u64, sha256: &str) -> Self {
        Self {
            size_bytes,
            sha256: sha256.to_string(),
            fail: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failing(mut self, reason: &str) -> Self {
        self.fail = Some(reason.to_string());
        self
    }
}

impl ArtifactInspector for FixedInspector {
    fn inspect(&self, path: &Path, _: ArtifactFormat, max_bytes: u64) -> Result<ArtifactInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail {
            anyhow::bail!("{reason}");
        }
        anyhow::ensure!(self.size_bytes <= max_bytes, "artifact too large");
        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            size_bytes: self.size_bytes,
            sha256: self.sha256.clone(),
        })
    }
}

// ── Remote shell ──────────────────────────────────────────────────────────────

/// Host connection scripted by command prefix.
///
/// The first rule whose prefix matches a command answers it; unmatched
/// commands succeed with empty output. Every command and upload is logged.
pub struct ScriptedHost {
    pub log: EventLog,
    rules: Mutex<Vec<(String, VecDeque<Output>)>>,
    pub fail_upload: bool,
}

impl ScriptedHost {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            rules: Mutex::new(Vec::new()),
            fail_upload: false,
        }
    }

    /// Answer commands starting with `prefix` with `outputs`, in turn; the
    /// last output repeats.
    #[must_use]
    pub fn on(self, prefix: &str, outputs: Vec<Output>) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), outputs.into()));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log
            .with_prefix("exec ")
            .into_iter()
            .map(|e| e["exec ".len()..].to_string())
            .collect()
    }
}

impl RemoteShell for ScriptedHost {
    async fn exec(&self, command: &str) -> Result<Output> {
        self.log.push(format!("exec {command}"));
        let mut rules = self.rules.lock().unwrap();
        for (prefix, outputs) in rules.iter_mut() {
            if command.starts_with(prefix.as_str()) {
                let out = if outputs.len() > 1 {
                    outputs.pop_front()
                } else {
                    outputs.front().cloned()
                };
                return Ok(out.unwrap_or_else(|| ok_output(b"")));
            }
        }
        Ok(ok_output(b""))
    }

    async fn upload(&self, local: &Path, remote_path: &str) -> Result<()> {
        self.log
            .push(format!("upload {} {remote_path}", local.display()));
        if self.fail_upload {
            anyhow::bail!("scp: connection lost");
        }
        Ok(())
    }
}

// ── Registry client ───────────────────────────────────────────────────────────

/// Registry connection backed by an in-memory tag → digest map.
pub struct FakeRegistry {
    pub log: EventLog,
    host: Option<String>,
    health_url: Option<String>,
    pub remote: Mutex<HashMap<String, String>>,
    pub fail_push: bool,
    inspect_error: Option<String>,
    pub inspections: AtomicUsize,
    next_digest: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(host: &str, log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            host: Some(host.to_string()),
            health_url: None,
            remote: Mutex::new(HashMap::new()),
            fail_push: false,
            inspect_error: None,
            inspections: AtomicUsize::new(0),
            next_digest: AtomicUsize::new(1),
        }
    }

    #[must_use]
    pub fn without_host(mut self) -> Self {
        self.host = None;
        self
    }

    #[must_use]
    pub fn with_health_url(mut self, url: &str) -> Self {
        self.health_url = Some(url.to_string());
        self
    }

    /// Fail every manifest lookup with `message`.
    #[must_use]
    pub fn with_inspect_error(mut self, message: &str) -> Self {
        self.inspect_error = Some(message.to_string());
        self
    }

    /// Seed an existing remote tag.
    #[must_use]
    pub fn with_remote(self, reference: &str, digest: &str) -> Self {
        self.remote
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest.to_string());
        self
    }

    pub fn digest_of(&self, reference: &str) -> Option<String> {
        self.remote.lock().unwrap().get(reference).cloned()
    }
}

impl RegistryClient for FakeRegistry {
    fn registry_host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn health_url(&self) -> Option<&str> {
        self.health_url.as_deref()
    }

    async fn load_archive(&self, archive: &Path) -> Result<String> {
        self.log.push(format!("load {}", archive.display()));
        Ok("bible-on-site-api:build".to_string())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.log.push(format!("tag {source} {target}"));
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<()> {
        self.log.push(format!("push {reference}"));
        if self.fail_push {
            anyhow::bail!("denied: requested access to the resource is denied");
        }
        let n = self.next_digest.fetch_add(1, Ordering::SeqCst);
        self.remote
            .lock()
            .unwrap()
            .insert(reference.to_string(), format!("sha256:{n:064}"));
        Ok(())
    }

    async fn remote_digest(&self, reference: &str) -> Result<Option<String>> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.inspect_error {
            anyhow::bail!("cannot inspect {reference}: {message}");
        }
        Ok(self.digest_of(reference))
    }

    async fn retag_remote(&self, source: &str, target: &str) -> Result<()> {
        self.log.push(format!("retag {source} {target}"));
        let digest = source
            .rsplit_once('@')
            .map(|(_, d)| d.to_string())
            .ok_or_else(|| anyhow::anyhow!("source must be a digest reference"))?;
        self.remote
            .lock()
            .unwrap()
            .insert(target.to_string(), digest);
        Ok(())
    }

    async fn remove_local(&self, reference: &str) -> Result<()> {
        self.log.push(format!("rmi {reference}"));
        Ok(())
    }
}

// ── HTTP probe ────────────────────────────────────────────────────────────────

/// Probe answering with a fixed status sequence; the last one repeats.
/// An empty sequence means the endpoint refuses connections.
#[derive(Clone)]
pub struct StatusProbe {
    codes: Arc<Mutex<VecDeque<u16>>>,
    calls: Arc<AtomicUsize>,
}

impl StatusProbe {
    pub fn new(codes: &[u16]) -> Self {
        Self {
            codes: Arc::new(Mutex::new(codes.iter().copied().collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpProbe for StatusProbe {
    async fn get_status(&self, _: &str, _: std::time::Duration) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut codes = self.codes.lock().unwrap();
        let code = if codes.len() > 1 {
            codes.pop_front()
        } else {
            codes.front().copied()
        };
        code.ok_or_else(|| anyhow::anyhow!("connection refused"))
    }
}
