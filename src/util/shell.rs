//! Status output for the CLI.
//!
//! Every user-facing progress line goes through [`Shell`] so that quiet,
//! verbose, and colour settings are applied in one place. Lines go to
//! stderr; stdout is reserved for command output such as `env`.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no spinners
    Quiet,
    #[default]
    Normal,
    /// --verbose: status lines only, no spinners (they would interleave with logs)
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Semantic status for a message. The shell picks wording and colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success (green)
    Registered,
    Installed,
    Pruned,
    Finished,
    Passed,

    // In progress (cyan)
    Cloning,
    Fetching,
    Checkout,
    Compiling,
    Installing,
    Pruning,
    Composing,
    Checking,

    // Info (blue)
    Info,

    // Warning (yellow)
    Skipped,
    Warning,

    // Error (red)
    Failed,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Registered => "Registered",
            Status::Installed => "Installed",
            Status::Pruned => "Pruned",
            Status::Finished => "Finished",
            Status::Passed => "Passed",
            Status::Cloning => "Cloning",
            Status::Fetching => "Fetching",
            Status::Checkout => "Checkout",
            Status::Compiling => "Compiling",
            Status::Installing => "Installing",
            Status::Pruning => "Pruning",
            Status::Composing => "Composing",
            Status::Checking => "Checking",
            Status::Info => "Info",
            Status::Skipped => "Skipped",
            Status::Warning => "Warning",
            Status::Failed => "Failed",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Registered
            | Status::Installed
            | Status::Pruned
            | Status::Finished
            | Status::Passed => "\x1b[1;32m",
            Status::Cloning
            | Status::Fetching
            | Status::Checkout
            | Status::Compiling
            | Status::Installing
            | Status::Pruning
            | Status::Composing
            | Status::Checking => "\x1b[1;36m",
            Status::Info => "\x1b[1;34m",
            Status::Skipped | Status::Warning => "\x1b[1;33m",
            Status::Failed => "\x1b[1;31m",
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Status::Failed)
    }
}

/// Central shell for CLI status output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
    interactive: bool,
}

impl Shell {
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let interactive = io::stderr().is_terminal();
        let use_color = match color {
            ColorChoice::Auto => interactive,
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };

        Shell {
            verbosity,
            use_color,
            interactive,
        }
    }

    /// Create a shell from CLI flags. Quiet wins over verbose.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        Shell::new(verbosity, color)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print `{status:>12} {message}` to stderr.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.verbosity == Verbosity::Quiet && !status.is_error() {
            return;
        }
        eprintln!("{} {}", self.format_status(status), msg);
    }

    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// A spinner for a long-running step, or `None` when it would not render.
    pub fn spinner(&self, status: Status, msg: impl Display) -> Option<ProgressBar> {
        if self.verbosity != Verbosity::Normal || !self.interactive {
            self.status(status, msg);
            return None;
        }

        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{prefix} {spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_prefix(self.format_status(status));
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        if self.use_color {
            format!("{}{:>12}\x1b[0m", status.color_code(), text)
        } else {
            format!("{:>12}", text)
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}
