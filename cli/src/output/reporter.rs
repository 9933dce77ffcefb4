//! Terminal and silent implementations of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use crate::application::ports::ProgressReporter;
use crate::output::{Mark, OutputContext};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ⚠ {message}"` (suppressed when `ctx.quiet`)
/// - `error()` prints `"  ✗ {message}"` to stderr (never suppressed)
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.ctx.line(Mark::Step, message);
    }

    fn success(&self, message: &str) {
        self.ctx.success(message);
    }

    fn warn(&self, message: &str) {
        self.ctx.warn(message);
    }

    fn error(&self, message: &str) {
        self.ctx.error(message);
    }
}

/// Reporter for `--json` runs: progress goes to the tracing log only, so
/// stdout carries nothing but the final document.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn step(&self, message: &str) {
        tracing::debug!(message, "step");
    }

    fn success(&self, message: &str) {
        tracing::debug!(message, "success");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(message, "warning");
    }

    fn error(&self, message: &str) {
        tracing::error!(message, "error");
    }
}
