//! Lint gate: format, type-check and lint a fixed file set, stopping at the
//! first failing stage.

pub mod stage;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::fs::glob_files;

pub use stage::{ProcessStageRunner, StageConfig, StageKind, StageResult, StageRunner};

/// Error preventing the gate from reaching a verdict.
#[derive(Debug, Error)]
pub enum LintError {
    #[error("no files matched {patterns:?}")]
    NoFiles { patterns: Vec<String> },

    #[error("invalid file pattern: {0:#}")]
    Pattern(anyhow::Error),

    #[error("lint stages are misconfigured: {0}")]
    Config(String),

    #[error("failed to run {stage} stage")]
    Runner {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },
}

/// Verdict of one gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintOutcome {
    Pass,
    Fail { stage: StageKind, diagnostics: String },
}

impl LintOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, LintOutcome::Pass)
    }
}

/// `[lint]` section: the file globs and the three stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    pub files: Vec<String>,
    pub stages: Vec<StageConfig>,
}

impl Default for LintConfig {
    fn default() -> Self {
        LintConfig {
            files: vec!["tools/*.py".to_string()],
            stages: vec![
                StageConfig::new(StageKind::Format, &["black", "--check", "-l", "120"], &[]),
                StageConfig::new(
                    StageKind::TypeCheck,
                    &["mypy", "--strict"],
                    &["import-untyped"],
                ),
                StageConfig::new(
                    StageKind::Lint,
                    &["pylint"],
                    &[
                        "line-too-long",
                        "missing-module-docstring",
                        "missing-class-docstring",
                        "missing-function-docstring",
                        "too-many-branches",
                        "too-many-return-statements",
                        "too-many-statements",
                        "too-many-locals",
                    ],
                ),
            ],
        }
    }
}

impl LintConfig {
    /// Exactly one stage per kind, each with a command.
    pub fn validate(&self) -> Result<(), LintError> {
        for kind in StageKind::ORDER {
            let count = self.stages.iter().filter(|s| s.kind == kind).count();
            if count != 1 {
                return Err(LintError::Config(format!(
                    "expected one {} stage, found {}",
                    kind, count
                )));
            }
        }
        if let Some(stage) = self.stages.iter().find(|s| s.command.is_empty()) {
            return Err(LintError::Config(format!("{} stage has no command", stage.kind)));
        }
        Ok(())
    }

    /// Expand the configured globs under `base`.
    pub fn resolve_files(&self, base: &Path) -> Result<Vec<PathBuf>, LintError> {
        let files = glob_files(base, &self.files).map_err(LintError::Pattern)?;
        if files.is_empty() {
            return Err(LintError::NoFiles {
                patterns: self.files.clone(),
            });
        }
        Ok(files)
    }
}

/// Ordered, fail-fast gate over the configured stages.
pub struct LintGate<R> {
    stages: Vec<StageConfig>,
    runner: R,
}

impl<R: StageRunner> LintGate<R> {
    pub fn new(config: &LintConfig, runner: R) -> Result<Self, LintError> {
        config.validate()?;
        let mut stages = config.stages.clone();
        stages.sort_by_key(|s| s.kind);
        Ok(LintGate { stages, runner })
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn run(&mut self, files: &[PathBuf]) -> Result<LintOutcome, LintError> {
        self.run_with(files, &mut |_| {})
    }

    /// Run every stage in order, calling `on_stage` before each one.
    pub fn run_with(
        &mut self,
        files: &[PathBuf],
        on_stage: &mut dyn FnMut(StageKind),
    ) -> Result<LintOutcome, LintError> {
        if files.is_empty() {
            return Err(LintError::NoFiles {
                patterns: Vec::new(),
            });
        }

        for stage in &self.stages {
            on_stage(stage.kind);
            tracing::info!(stage = %stage.kind, files = files.len(), "running lint stage");

            let result = self
                .runner
                .run(stage, files)
                .map_err(|source| LintError::Runner {
                    stage: stage.kind,
                    source,
                })?;

            if !result.success {
                tracing::debug!(stage = %stage.kind, "lint stage failed");
                return Ok(LintOutcome::Fail {
                    stage: stage.kind,
                    diagnostics: result.output,
                });
            }
        }

        Ok(LintOutcome::Pass)
    }
}
