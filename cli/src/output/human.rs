//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;
use shipyard_common::DeployPhase;

use crate::domain::release::{DeployRecord, FleetReport};
use crate::domain::target::{Secret, TargetSet};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("shipyard v{version}"));
    }

    /// Render a resolved module version and its release tag.
    pub fn render_resolved(&self, module: &str, version: &str, tag: &str, released: Option<&str>) {
        if self.ctx.quiet {
            println!("{version}");
            return;
        }
        self.ctx.kv("Module:  ", module);
        self.ctx.kv("Version: ", version);
        self.ctx.kv("Tag:     ", tag);
        self.ctx.kv("Released:", released.unwrap_or("none"));
    }

    /// Render the per-target summary of a fleet run.
    ///
    /// The failure cause itself is left to the caller's error path.
    pub fn render_report(&self, report: &FleetReport) {
        if !self.ctx.quiet {
            println!();
            let version = report.version.as_deref().unwrap_or("?");
            self.ctx.header(&format!(
                "{}@{version} via {} targets",
                report.module, report.kind
            ));
            for record in &report.records {
                println!("{}", self.record_line(record));
            }
            for warning in &report.warnings {
                self.ctx.warn(warning);
            }
        }

        if report.is_success() {
            self.ctx.success(&format!(
                "{} target(s) deployed, finalized and released",
                report.records.len()
            ));
            return;
        }

        let rolled_back: Vec<&str> = report.rolled_back().collect();
        if !rolled_back.is_empty() {
            self.ctx
                .warn(&format!("rolled back: {}", rolled_back.join(", ")));
        }
    }

    fn record_line(&self, record: &DeployRecord) -> String {
        let styles = &self.ctx.styles;
        let phase = format!("{:<12}", phase_label(record));
        let phase = match record.phase {
            DeployPhase::Finalized | DeployPhase::Succeeded => phase.style(styles.success).to_string(),
            DeployPhase::Failed => phase.style(styles.error).to_string(),
            DeployPhase::RolledBack => phase.style(styles.warning).to_string(),
            _ => phase.style(styles.dim).to_string(),
        };
        let mut line = format!("    {:<16} {phase}", record.target);
        if let Some(prev) = &record.previous_version {
            line.push_str(&format!(" (was {})", short_version(prev)));
        }
        if let Some(err) = &record.error {
            line.push_str(&format!("  {}", err.style(styles.dim)));
        }
        if let Some(err) = &record.rollback_error {
            line.push_str(&format!("  rollback: {}", err.style(styles.warning)));
        }
        line
    }

    /// Render the configured targets with credentials masked.
    pub fn render_targets(&self, targets: &TargetSet) {
        if targets.hosts.is_empty() && targets.registries.is_empty() {
            self.ctx.info("No targets configured.");
            self.ctx
                .info("Set SHIPYARD_HOST_<NAME>_IP or SHIPYARD_REGISTRY_<NAME>_URL, or add a fleet file.");
            return;
        }
        if !targets.hosts.is_empty() {
            self.ctx.header("Hosts:");
            for host in targets.hosts.values() {
                println!(
                    "    {:<16} {}@{}  key: {}  passphrase: {}",
                    host.name,
                    host.user.as_deref().unwrap_or("-"),
                    host.ip.as_deref().unwrap_or("-"),
                    mask(host.ssh_key.as_ref()),
                    mask(host.passphrase.as_ref()),
                );
            }
        }
        if !targets.registries.is_empty() {
            self.ctx.header("Registries:");
            for reg in targets.registries.values() {
                println!(
                    "    {:<16} {}  account: {}  token: {}",
                    reg.name,
                    reg.url.as_deref().unwrap_or("-"),
                    reg.account.as_deref().unwrap_or("-"),
                    mask(reg.token.as_ref()),
                );
            }
        }
    }
}

fn phase_label(record: &DeployRecord) -> String {
    match record.phase {
        DeployPhase::Idle => "skipped".to_string(),
        phase => phase.to_string(),
    }
}

/// Digests are long; keep the algorithm and the first 12 hex chars.
fn short_version(version: &str) -> &str {
    match version.strip_prefix("sha256:") {
        Some(hex) if hex.len() > 12 => &version[.."sha256:".len() + 12],
        _ => version,
    }
}

pub(crate) fn mask(secret: Option<&Secret>) -> String {
    secret.map_or_else(|| "-".to_string(), ToString::to_string)
}
