//! Lint stages and the runner seam they execute through.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::process::{combined_output, find_executable, ProcessBuilder};

/// What a stage checks. Stages always run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Format,
    TypeCheck,
    Lint,
}

impl StageKind {
    pub const ORDER: [StageKind; 3] = [StageKind::Format, StageKind::TypeCheck, StageKind::Lint];

    /// Command-line arguments that switch off the suppressed categories.
    pub fn suppression_args(&self, suppress: &[String]) -> Vec<String> {
        if suppress.is_empty() {
            return Vec::new();
        }
        match self {
            StageKind::Format => Vec::new(),
            StageKind::TypeCheck => suppress
                .iter()
                .map(|code| format!("--disable-error-code={}", code))
                .collect(),
            StageKind::Lint => vec![format!("--disable={}", suppress.join(","))],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Format => "format",
            StageKind::TypeCheck => "typecheck",
            StageKind::Lint => "lint",
        };
        f.write_str(s)
    }
}

/// A configured stage: the tool invocation and its fixed suppressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub kind: StageKind,
    pub command: Vec<String>,
    #[serde(default)]
    pub suppress: Vec<String>,
}

impl StageConfig {
    pub fn new(kind: StageKind, command: &[&str], suppress: &[&str]) -> Self {
        StageConfig {
            kind,
            command: command.iter().map(|s| s.to_string()).collect(),
            suppress: suppress.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Full argv for `files`: command, suppressions, then the files.
    pub fn argv(&self, files: &[PathBuf]) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend(self.kind.suppression_args(&self.suppress));
        argv.extend(files.iter().map(|f| f.display().to_string()));
        argv
    }
}

/// How a stage finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub success: bool,
    pub output: String,
}

/// Executes one stage.
pub trait StageRunner {
    fn run(&mut self, stage: &StageConfig, files: &[PathBuf]) -> anyhow::Result<StageResult>;
}

/// Runs stages as subprocesses, optionally from a fixed directory.
#[derive(Debug, Default)]
pub struct ProcessStageRunner {
    cwd: Option<PathBuf>,
}

impl ProcessStageRunner {
    pub fn new() -> Self {
        ProcessStageRunner::default()
    }

    pub fn with_cwd(cwd: impl AsRef<Path>) -> Self {
        ProcessStageRunner {
            cwd: Some(cwd.as_ref().to_path_buf()),
        }
    }
}

impl StageRunner for ProcessStageRunner {
    fn run(&mut self, stage: &StageConfig, files: &[PathBuf]) -> anyhow::Result<StageResult> {
        let argv = stage.argv(files);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("{} stage has an empty command", stage.kind))?;

        let program = find_executable(program)
            .ok_or_else(|| anyhow::anyhow!("`{}` not found in PATH", program))?;

        let mut pb = ProcessBuilder::new(program).args(args);
        if let Some(cwd) = &self.cwd {
            pb = pb.cwd(cwd);
        }

        let output = pb.exec()?;
        Ok(StageResult {
            success: output.status.success(),
            output: combined_output(&output),
        })
    }
}
