//! Terminal output for human-facing commands.
//!
//! `--json` paths bypass this module entirely and print through [`json`].

pub mod human;
pub mod json;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::{OwoColorize as _, Style};
pub use human::HumanRenderer;
pub use reporter::{SilentReporter, TerminalReporter};
pub use styles::Styles;

/// Leading symbol of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Step,
    Success,
    Warning,
    Error,
    Info,
}

impl Mark {
    fn symbol(self) -> &'static str {
        match self {
            Mark::Step => "→",
            Mark::Success => "✓",
            Mark::Warning => "⚠",
            Mark::Error => "✗",
            Mark::Info => "ℹ",
        }
    }

    fn style(self, styles: &Styles) -> Style {
        match self {
            Mark::Step => styles.step,
            Mark::Success => styles.success,
            Mark::Warning => styles.warning,
            Mark::Error => styles.error,
            Mark::Info => styles.info,
        }
    }
}

/// Styling and verbosity shared by the renderer and the progress reporter.
pub struct OutputContext {
    pub styles: Styles,
    /// Suppresses everything except errors.
    pub quiet: bool,
}

impl OutputContext {
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let mut styles = Styles::default();
        if colors_wanted(no_color, Term::stdout().is_term(), std::env::var_os("NO_COLOR").is_some()) {
            styles.colorize();
        }
        Self { styles, quiet }
    }

    /// Format one status line, e.g. `  ✓ website@1.2.0 live on 2 target(s)`.
    #[must_use]
    pub fn format_line(&self, mark: Mark, msg: &str) -> String {
        format!("  {} {msg}", mark.symbol().style(mark.style(&self.styles)))
    }

    /// Print a status line. Errors go to stderr and ignore `quiet`.
    pub fn line(&self, mark: Mark, msg: &str) {
        if mark == Mark::Error {
            eprintln!("{}", self.format_line(mark, msg));
        } else if !self.quiet {
            println!("{}", self.format_line(mark, msg));
        }
    }

    pub fn success(&self, msg: &str) {
        self.line(Mark::Success, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.line(Mark::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.line(Mark::Error, msg);
    }

    pub fn info(&self, msg: &str) {
        self.line(Mark::Info, msg);
    }

    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Aligned `label  value` row with a dimmed label.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Colour only an interactive stdout, and never when the user opted out via
/// `--no-color` or `NO_COLOR`.
#[must_use]
pub fn colors_wanted(no_color_flag: bool, stdout_is_tty: bool, no_color_env: bool) -> bool {
    stdout_is_tty && !no_color_flag && !no_color_env
}
