//! SSH connection to a host target over an OpenSSH control master.
//!
//! `connect()` authenticates once and leaves a persistent master behind a
//! private control socket; every command and upload reuses it.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use shipyard_common::ConnectionState;
use tempfile::TempDir;

use crate::application::ports::{CommandRunner, Invocation, RemoteShell, TargetConnection};
use crate::domain::error::ConnectionError;
use crate::domain::target::HostTarget;

/// Per-target session material; dropping it removes the temp dir.
struct Session {
    dir: TempDir,
    control_path: PathBuf,
    destination: String,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    session: Option<Session>,
    disposed: bool,
}

pub struct SshConnection<R> {
    target: HostTarget,
    runner: R,
    connect_timeout: Duration,
    command_timeout: Duration,
    inner: Mutex<Inner>,
}

impl<R: CommandRunner> SshConnection<R> {
    pub fn new(target: HostTarget, runner: R, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            target,
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

    /// `(control_path, destination)` of the live session.
    fn live(&self) -> Result<(PathBuf, String)> {
        let inner = self.lock();
        match (&inner.session, inner.state) {
            (Some(s), ConnectionState::Connected) => Ok((s.control_path.clone(), s.destination.clone())),
            _ => anyhow::bail!("not connected to host '{}'", self.target.name),
        }
    }

    async fn open(&self) -> Result<Session> {
        let destination = destination(&self.target)?;
        let dir = tempfile::Builder::new()
            .prefix("shipyard-ssh-")
            .tempdir()
            .context("cannot create ssh session dir")?;
        let control_path = dir.path().join("cm");

        let key_path = match &self.target.ssh_key {
            Some(key) => Some(materialize_key(key.expose(), dir.path())?),
            None => None,
        };
        let passphrase = self.target.passphrase.as_ref().map(|p| p.expose().to_string());

        let ssh_args = master_args(
            &destination,
            &control_path,
            key_path.as_deref(),
            self.connect_timeout,
            passphrase.is_none(),
        );
        let ssh_refs: Vec<&str> = ssh_args.iter().map(String::as_str).collect();
        let timeout = self.connect_timeout + Duration::from_secs(5);

        let output = match &passphrase {
            Some(pass) => {
                let mut args = vec!["-e", "-P", "passphrase", "ssh"];
                args.extend(ssh_refs.iter().copied());
                let envs = [("SSHPASS", pass.as_str())];
                self.runner
                    .execute(&Invocation::new("sshpass", &args).envs(&envs).timeout(timeout))
                    .await?
            }
            None => {
                self.runner
                    .execute(&Invocation::new("ssh", &ssh_refs).timeout(timeout))
                    .await?
            }
        };
        if !output.status.success() {
            anyhow::bail!(
                "ssh to {destination} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Session {
            dir,
            control_path,
            destination,
        })
    }
}

impl<R: CommandRunner> TargetConnection for SshConnection<R> {
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
            Ok(session) => {
                tracing::debug!(
                    host = %self.target.name,
                    session_dir = %session.dir.path().display(),
                    "ssh control master up"
                );
                let mut inner = self.lock();
                inner.session = Some(session);
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
        let session = {
            let mut inner = self.lock();
            inner.disposed = true;
            inner.state = ConnectionState::Disconnected;
            inner.session.take()
        };
        let Some(session) = session else { return };
        let args = exit_args(&session.destination, &session.control_path);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        if let Err(e) = self
            .runner
            .execute(&Invocation::new("ssh", &refs).timeout(self.connect_timeout))
            .await
        {
            tracing::warn!(host = %self.target.name, error = %e, "cannot stop ssh control master");
        }
    }
}

impl<R: CommandRunner> RemoteShell for SshConnection<R> {
    async fn exec(&self, command: &str) -> Result<Output> {
        let (control, destination) = self.live()?;
        let args = exec_args(&destination, &control, command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(host = %self.target.name, command, "remote exec");
        self.runner
            .execute(&Invocation::new("ssh", &refs).timeout(self.command_timeout))
            .await
    }

    async fn upload(&self, local: &Path, remote_path: &str) -> Result<()> {
        let (control, destination) = self.live()?;
        let args = scp_args(&destination, &control, local, remote_path);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .runner
            .execute(&Invocation::new("scp", &refs).timeout(self.command_timeout))
            .await?;
        if !out.status.success() {
            anyhow::bail!(
                "scp to {destination}:{remote_path} failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }
}

// ── Argument builders ─────────────────────────────────────────────────────────

/// `user@ip` for a host target.
fn destination(target: &HostTarget) -> Result<String> {
    match (&target.user, &target.ip) {
        (Some(user), Some(ip)) => Ok(format!("{user}@{ip}")),
        (None, _) => anyhow::bail!("missing user (set SHIPYARD_HOST_<NAME>_USER)"),
        (_, None) => anyhow::bail!("missing ip (set SHIPYARD_HOST_<NAME>_IP)"),
    }
}

fn control_option(control_path: &Path) -> String {
    format!("ControlPath={}", control_path.display())
}

/// Authenticate and leave a persistent master behind `control_path`.
///
/// ControlPersist detaches the master from our stdio, so the probe command
/// returns as soon as authentication succeeds.
fn master_args(
    destination: &str,
    control_path: &Path,
    key: Option<&Path>,
    connect_timeout: Duration,
    batch: bool,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "ControlMaster=auto".to_string(),
        "-o".to_string(),
        "ControlPersist=yes".to_string(),
        "-o".to_string(),
        control_option(control_path),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-o".to_string(),
        format!("BatchMode={}", if batch { "yes" } else { "no" }),
    ];
    if let Some(key) = key {
        args.extend([
            "-i".to_string(),
            key.display().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ]);
    }
    args.extend([destination.to_string(), "true".to_string()]);
    args
}

fn exec_args(destination: &str, control_path: &Path, command: &str) -> Vec<String> {
    vec![
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        control_option(control_path),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        destination.to_string(),
        "--".to_string(),
        command.to_string(),
    ]
}

fn scp_args(destination: &str, control_path: &Path, local: &Path, remote_path: &str) -> Vec<String> {
    vec![
        "-q".to_string(),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        control_option(control_path),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        local.display().to_string(),
        format!("{destination}:{remote_path}"),
    ]
}

fn exit_args(destination: &str, control_path: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        control_option(control_path),
        "-O".to_string(),
        "exit".to_string(),
        destination.to_string(),
    ]
}

/// Inline key material rather than a path.
fn is_key_material(value: &str) -> bool {
    value.contains("-----BEGIN") && value.contains("PRIVATE KEY")
}

/// Key file for `ssh -i`: the path as given, or inline material written to
/// a 0600 file inside `dir`.
fn materialize_key(value: &str, dir: &Path) -> Result<PathBuf> {
    if !is_key_material(value) {
        let path = match value.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?
                .join(rest),
            None => PathBuf::from(value),
        };
        anyhow::ensure!(path.is_file(), "ssh key {} not found", path.display());
        return Ok(path);
    }
    let path = dir.join("id");
    let mut material = value.replace("\\n", "\n");
    if !material.ends_with('\n') {
        material.push('\n');
    }
    std::fs::write(&path, material).with_context(|| format!("write {}", path.display()))?;
    set_permissions(&path, 0o600)?;
    Ok(path)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
