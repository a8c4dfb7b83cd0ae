//! Lifecycle of the engine working tree.
//!
//! `ClonedTree -> BuiltTree -> InstalledTree`: each transition consumes the
//! previous state, so pruning is only reachable after a successful install.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use super::prune::{prune, PruneError, PruneList, PruneReport};
use super::toolchain::ResolvedToolchain;
use super::{BuildError, BuildStep, InstalledWrapper, WrapperSpec};
use crate::sources::GitWorktree;
use crate::util::fs::symlink;
use crate::util::hash::sha256_file;
use crate::util::process::{combined_output, ProcessBuilder};

/// Source checked out at the pinned revision.
#[derive(Debug)]
pub struct ClonedTree {
    workdir: PathBuf,
}

/// Tree after a successful compile.
#[derive(Debug)]
pub struct BuiltTree {
    workdir: PathBuf,
}

/// Tree whose binaries have been installed under `prefix`.
#[derive(Debug)]
pub struct InstalledTree {
    workdir: PathBuf,
    prefix: PathBuf,
}

impl ClonedTree {
    /// Take over a checked-out worktree, releasing the repository handle.
    pub(crate) fn from_worktree(worktree: GitWorktree) -> Self {
        ClonedTree {
            workdir: worktree.path().to_path_buf(),
        }
    }

    /// Run the build command with `-j<jobs>` and `PREFIX=<prefix>`.
    pub fn compile(
        self,
        command: &[String],
        toolchain: &ResolvedToolchain,
        prefix: &Path,
        jobs: usize,
    ) -> Result<BuiltTree, BuildError> {
        let jobs_arg = format!("-j{}", jobs.max(1));
        run_step(
            BuildStep::Compile,
            command,
            &[jobs_arg],
            toolchain,
            prefix,
            &self.workdir,
        )?;

        Ok(BuiltTree {
            workdir: self.workdir,
        })
    }
}

impl BuiltTree {
    pub fn install(
        self,
        command: &[String],
        toolchain: &ResolvedToolchain,
        prefix: &Path,
    ) -> Result<InstalledTree, BuildError> {
        run_step(
            BuildStep::Install,
            command,
            &[],
            toolchain,
            prefix,
            &self.workdir,
        )?;

        Ok(InstalledTree {
            workdir: self.workdir,
            prefix: prefix.to_path_buf(),
        })
    }
}

impl InstalledTree {
    /// Locate every wrapper under `<prefix>/bin`, creating configured
    /// symlinks for the ones the install step did not produce.
    pub fn link_wrappers(&self, specs: &[WrapperSpec]) -> Result<Vec<InstalledWrapper>, BuildError> {
        let bin = self.prefix.join("bin");
        let mut wrappers = Vec::with_capacity(specs.len());

        for spec in specs {
            let path = bin.join(&spec.binary);

            if path.symlink_metadata().is_err() {
                if let Some(target) = &spec.symlink_to {
                    if !bin.join(target).exists() {
                        return Err(BuildError::MissingWrapper(bin.join(target)));
                    }
                    symlink(Path::new(target), &path).map_err(|source| BuildError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    tracing::debug!(link = %path.display(), target, "created wrapper symlink");
                }
            }

            if !path.exists() {
                return Err(BuildError::MissingWrapper(path));
            }

            let sha256 = sha256_file(&path).map_err(|e| BuildError::Io {
                path: path.clone(),
                source: std::io::Error::other(format!("{:#}", e)),
            })?;

            wrappers.push(InstalledWrapper {
                alias: spec.alias.clone(),
                path,
                priority: spec.priority,
                sha256,
            });
        }

        Ok(wrappers)
    }

    /// Delete the prune list from the working tree. Irreversible.
    pub fn prune(self, list: &PruneList) -> Result<PruneReport, PruneError> {
        prune(&self.workdir, list)
    }
}

fn run_step(
    step: BuildStep,
    command: &[String],
    extra_args: &[String],
    toolchain: &ResolvedToolchain,
    prefix: &Path,
    cwd: &Path,
) -> Result<(), BuildError> {
    let prefix_arg = format!("PREFIX={}", prefix.display());
    let mut pb = ProcessBuilder::from_argv(command)
        .ok_or(BuildError::EmptyCommand { step })?
        .args(extra_args)
        .arg(&prefix_arg)
        .env("PREFIX", prefix.display().to_string())
        .cwd(cwd);
    for (key, value) in toolchain.env() {
        pb = pb.env(key, value);
    }

    let command_line = pb.display_command();
    tracing::info!(step = %step, command = %command_line, "running build step");

    let output = pb.exec().map_err(|e| BuildError::Spawn {
        command: command_line.clone(),
        message: format!("{:#}", e),
    })?;

    if output.status.success() {
        return Ok(());
    }

    let status = describe_status(&output.status);
    let diagnostics = combined_output(&output);
    Err(match step {
        BuildStep::Install => BuildError::Install {
            command: command_line,
            status,
            diagnostics,
        },
        _ => BuildError::Compile {
            command: command_line,
            status,
            diagnostics,
        },
    })
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// Make sure `dir`'s parent exists so clone can create `dir` itself.
pub(crate) fn ensure_parent(dir: &Path) -> Result<(), BuildError> {
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
