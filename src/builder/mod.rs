//! Engine builder.
//!
//! Clones the fuzzing engine at a pinned revision, compiles and installs it
//! into a versioned prefix with the currently bound system compilers, then
//! prunes the working tree.

pub mod prune;
pub mod toolchain;
pub mod tree;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alternatives::DEFAULT_PRIORITY;
use crate::core::source_ref::SourceRefError;
use crate::core::SourceRef;
use crate::sources::{GitError, GitWorktree};
use crate::util::fs::is_missing_or_empty_dir;
use crate::util::process::default_jobs;

pub use prune::{PruneError, PruneList, PruneReport};
pub use toolchain::{BuildToolchain, ResolvedToolchain};
pub use tree::{BuiltTree, ClonedTree, InstalledTree};

/// Characters of the commit id used to name the install prefix.
const PREFIX_ID_LEN: usize = 12;

/// A step of the build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Prepare,
    Clone,
    Fetch,
    Checkout,
    Submodules,
    Compile,
    Install,
    Wrappers,
    Prune,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStep::Prepare => "prepare",
            BuildStep::Clone => "clone",
            BuildStep::Fetch => "fetch",
            BuildStep::Checkout => "checkout",
            BuildStep::Submodules => "submodules",
            BuildStep::Compile => "compile",
            BuildStep::Install => "install",
            BuildStep::Wrappers => "wrappers",
            BuildStep::Prune => "prune",
        };
        f.write_str(s)
    }
}

/// Error building the engine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("working directory `{0}` is not empty (use --force to replace it)")]
    WorkdirNotEmpty(PathBuf),

    #[error("install prefix `{0}` already exists (use --force to replace it)")]
    PrefixExists(PathBuf),

    #[error("failed to prepare `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Source(#[from] GitError),

    #[error("{step} command is empty")]
    EmptyCommand { step: BuildStep },

    #[error("failed to run `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("compile failed: `{command}` exited with {status}\n{diagnostics}")]
    Compile {
        command: String,
        status: String,
        diagnostics: String,
    },

    #[error("install failed: `{command}` exited with {status}\n{diagnostics}")]
    Install {
        command: String,
        status: String,
        diagnostics: String,
    },

    #[error("wrapper `{0}` was not installed")]
    MissingWrapper(PathBuf),

    #[error(transparent)]
    Prune(#[from] PruneError),
}

impl BuildError {
    /// The step that failed.
    pub fn step(&self) -> BuildStep {
        match self {
            BuildError::WorkdirNotEmpty(_) | BuildError::PrefixExists(_) | BuildError::Io { .. } => {
                BuildStep::Prepare
            }
            BuildError::Source(GitError::Clone { .. }) => BuildStep::Clone,
            BuildError::Source(GitError::Fetch { .. }) => BuildStep::Fetch,
            BuildError::Source(GitError::RevisionNotFound { .. })
            | BuildError::Source(GitError::Checkout { .. }) => BuildStep::Checkout,
            BuildError::Source(GitError::Submodule { .. }) => BuildStep::Submodules,
            BuildError::EmptyCommand { step } => *step,
            BuildError::Spawn { .. } | BuildError::Compile { .. } => BuildStep::Compile,
            BuildError::Install { .. } => BuildStep::Install,
            BuildError::MissingWrapper(_) => BuildStep::Wrappers,
            BuildError::Prune(_) => BuildStep::Prune,
        }
    }
}

/// A binary the install step must provide, and the alias it is offered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperSpec {
    pub alias: String,
    /// File name under `<prefix>/bin`.
    pub binary: String,
    /// Create `binary` as a symlink to this sibling if install did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_to: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Engine build settings (`[engine]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub repository: String,
    pub branch: String,
    pub revision: String,
    pub workdir: PathBuf,
    pub install_root: PathBuf,
    pub build_command: Vec<String>,
    pub install_command: Vec<String>,
    /// Parallel jobs; defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    pub prune: PruneList,
    pub toolchain: BuildToolchain,
    pub wrappers: Vec<WrapperSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            repository: "https://github.com/AFLplusplus/AFLplusplus".to_string(),
            branch: "stable".to_string(),
            revision: "v4.21c".to_string(),
            workdir: PathBuf::from("/AFLplusplus"),
            install_root: PathBuf::from("/opt/aflplusplus"),
            build_command: vec!["make".to_string(), "source-only".to_string()],
            install_command: vec!["make".to_string(), "install".to_string()],
            jobs: None,
            prune: PruneList::new([
                "qemu_mode",
                "unicorn_mode",
                "nyx_mode",
                "frida_mode",
                "coresight_mode",
                ".git",
            ]),
            toolchain: BuildToolchain::default(),
            wrappers: vec![
                WrapperSpec {
                    alias: "afl-cc".to_string(),
                    binary: "afl-clang-fast".to_string(),
                    symlink_to: Some("afl-cc".to_string()),
                    priority: DEFAULT_PRIORITY,
                },
                WrapperSpec {
                    alias: "afl-c++".to_string(),
                    binary: "afl-clang-fast++".to_string(),
                    symlink_to: Some("afl-c++".to_string()),
                    priority: DEFAULT_PRIORITY,
                },
            ],
        }
    }
}

impl EngineConfig {
    pub fn source_ref(&self) -> Result<SourceRef, SourceRefError> {
        SourceRef::new(&self.repository, &self.branch, &self.revision)
    }
}

/// An installed wrapper binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledWrapper {
    pub alias: String,
    pub path: PathBuf,
    pub priority: i32,
    pub sha256: String,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// `repository#branch@revision` the build was requested for.
    pub source: String,
    pub commit: String,
    pub prefix: PathBuf,
    pub wrappers: Vec<InstalledWrapper>,
    pub prune: PruneReport,
}

/// Clones, builds, installs and prunes the engine.
#[derive(Debug, Clone)]
pub struct ToolchainBuilder {
    workdir: PathBuf,
    install_root: PathBuf,
    build_command: Vec<String>,
    install_command: Vec<String>,
    jobs: usize,
    wrappers: Vec<WrapperSpec>,
    force: bool,
}

impl ToolchainBuilder {
    pub fn from_config(config: &EngineConfig) -> Self {
        ToolchainBuilder {
            workdir: config.workdir.clone(),
            install_root: config.install_root.clone(),
            build_command: config.build_command.clone(),
            install_command: config.install_command.clone(),
            jobs: config.jobs.unwrap_or_else(default_jobs),
            wrappers: config.wrappers.clone(),
            force: false,
        }
    }

    /// Replace a non-empty working directory or an existing prefix.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// The prefix a build of `commit` installs into.
    pub fn prefix_for(&self, commit: &str) -> PathBuf {
        let id = commit.get(..PREFIX_ID_LEN).unwrap_or(commit);
        self.install_root.join(id)
    }

    pub fn build(
        &self,
        source: &SourceRef,
        toolchain: &ResolvedToolchain,
        prune: &PruneList,
    ) -> Result<Installation, BuildError> {
        self.build_with(source, toolchain, prune, &mut |_| {})
    }

    /// Like [`build`](Self::build), reporting each step before it starts.
    ///
    /// Nothing is installed unless compile succeeds, and nothing is pruned
    /// unless install succeeds.
    pub fn build_with(
        &self,
        source: &SourceRef,
        toolchain: &ResolvedToolchain,
        prune: &PruneList,
        on_step: &mut dyn FnMut(BuildStep),
    ) -> Result<Installation, BuildError> {
        on_step(BuildStep::Prepare);
        prune.validate()?;
        if self.build_command.is_empty() {
            return Err(BuildError::EmptyCommand {
                step: BuildStep::Compile,
            });
        }
        if self.install_command.is_empty() {
            return Err(BuildError::EmptyCommand {
                step: BuildStep::Install,
            });
        }
        self.prepare_workdir()?;

        on_step(BuildStep::Clone);
        let worktree = GitWorktree::clone(source, &self.workdir)?;

        on_step(BuildStep::Fetch);
        let tip = worktree.fetch_branch(source.branch())?;

        on_step(BuildStep::Checkout);
        let commit = worktree.checkout_revision(source.revision(), source.branch(), tip)?;

        on_step(BuildStep::Submodules);
        let submodules = worktree.update_submodules()?;
        tracing::debug!(submodules, "submodules updated");

        let commit_id = commit.to_string();
        let prefix = self.prefix_for(&commit_id);
        self.prepare_prefix(&prefix)?;

        let cloned = ClonedTree::from_worktree(worktree);

        on_step(BuildStep::Compile);
        let built = cloned.compile(&self.build_command, toolchain, &prefix, self.jobs)?;

        on_step(BuildStep::Install);
        let installed = built.install(&self.install_command, toolchain, &prefix)?;

        on_step(BuildStep::Wrappers);
        let wrappers = installed.link_wrappers(&self.wrappers)?;

        on_step(BuildStep::Prune);
        let report = installed.prune(prune)?;
        tracing::info!(
            removed = report.removed.len(),
            freed_bytes = report.freed_bytes,
            "pruned working tree"
        );

        Ok(Installation {
            source: source.to_string(),
            commit: commit_id,
            prefix,
            wrappers,
            prune: report,
        })
    }

    fn prepare_workdir(&self) -> Result<(), BuildError> {
        let io_err = |source| BuildError::Io {
            path: self.workdir.clone(),
            source,
        };

        if !is_missing_or_empty_dir(&self.workdir).map_err(io_err)? {
            if !self.force {
                return Err(BuildError::WorkdirNotEmpty(self.workdir.clone()));
            }
            tracing::warn!(workdir = %self.workdir.display(), "replacing working directory");
            std::fs::remove_dir_all(&self.workdir).map_err(io_err)?;
        }
        tree::ensure_parent(&self.workdir)
    }

    fn prepare_prefix(&self, prefix: &Path) -> Result<(), BuildError> {
        if prefix.symlink_metadata().is_err() {
            return Ok(());
        }
        if !self.force {
            return Err(BuildError::PrefixExists(prefix.to_path_buf()));
        }
        tracing::warn!(prefix = %prefix.display(), "replacing install prefix");
        std::fs::remove_dir_all(prefix).map_err(|source| BuildError::Io {
            path: prefix.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OriginRepo;
    use tempfile::TempDir;

    struct Fixture {
        origin: OriginRepo,
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                origin: OriginRepo::new(),
                root: TempDir::new().unwrap(),
            }
        }

        fn config(&self) -> EngineConfig {
            EngineConfig {
                repository: self.origin.url(),
                branch: "main".to_string(),
                revision: "main".to_string(),
                workdir: self.root.path().join("src"),
                install_root: self.root.path().join("opt"),
                build_command: vec!["sh".to_string(), "build.sh".to_string()],
                install_command: vec!["sh".to_string(), "install.sh".to_string()],
                jobs: Some(2),
                prune: PruneList::new(["qemu_mode", "unicorn_mode", "nyx_mode", ".git"]),
                toolchain: BuildToolchain::default(),
                wrappers: vec![
                    WrapperSpec {
                        alias: "afl-cc".to_string(),
                        binary: "afl-clang-fast".to_string(),
                        symlink_to: None,
                        priority: 100,
                    },
                    WrapperSpec {
                        alias: "afl-c++".to_string(),
                        binary: "afl-clang-fast++".to_string(),
                        symlink_to: Some("afl-clang-fast".to_string()),
                        priority: 100,
                    },
                ],
            }
        }

        fn toolchain(&self) -> ResolvedToolchain {
            ResolvedToolchain {
                cc: PathBuf::from("/usr/bin/cc"),
                cxx: PathBuf::from("/usr/bin/c++"),
            }
        }
    }

    #[test]
    fn test_build_installs_and_prunes() {
        let fx = Fixture::new();
        let config = fx.config();
        let source = config.source_ref().unwrap();
        let builder = ToolchainBuilder::from_config(&config);

        let mut steps = Vec::new();
        let install = builder
            .build_with(&source, &fx.toolchain(), &config.prune, &mut |s| steps.push(s))
            .unwrap();

        assert_eq!(install.commit, fx.origin.head().to_string());
        assert_eq!(install.prefix, fx.root.path().join("opt").join(&install.commit[..12]));
        assert!(install.prefix.join("bin/afl-clang-fast").is_file());
        assert!(install.prefix.join("lib/afl/afl-compiler-rt.o").is_file());
        assert_eq!(install.wrappers.len(), 2);
        assert_eq!(install.wrappers[0].sha256, install.wrappers[1].sha256);

        let workdir = fx.root.path().join("src");
        assert!(!workdir.join("qemu_mode").exists());
        assert!(!workdir.join(".git").exists());
        assert!(workdir.join("build.sh").exists());
        assert_eq!(install.prune.absent, vec![PathBuf::from("nyx_mode")]);
        assert!(install.prune.freed_bytes > 0);

        assert_eq!(steps.first(), Some(&BuildStep::Prepare));
        assert_eq!(steps.last(), Some(&BuildStep::Prune));
    }

    #[test]
    fn test_build_passes_jobs_prefix_and_compilers() {
        let fx = Fixture::new();
        fx.origin.commit_file(
            "build.sh",
            "mkdir -p out\n\
             echo \"$@\" > out/args\n\
             echo \"$PREFIX $CC $CXX\" > out/env\n\
             printf '#!/bin/sh\\n' > out/afl-clang-fast\n",
            "record build invocation",
        );
        let config = fx.config();
        let builder = ToolchainBuilder::from_config(&config);
        let install = builder
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &PruneList::default())
            .unwrap();

        let out = fx.root.path().join("src/out");
        let args = std::fs::read_to_string(out.join("args")).unwrap();
        assert_eq!(
            args.trim(),
            format!("-j2 PREFIX={}", install.prefix.display())
        );
        let env = std::fs::read_to_string(out.join("env")).unwrap();
        assert_eq!(
            env.trim(),
            format!("{} /usr/bin/cc /usr/bin/c++", install.prefix.display())
        );
    }

    #[test]
    fn test_build_at_tag_after_branch_moved() {
        let fx = Fixture::new();
        let pinned = fx.origin.head();
        fx.origin.tag("v1.0", pinned);
        fx.origin.commit_file("NEWS", "later\n", "move main");

        let mut config = fx.config();
        config.revision = "v1.0".to_string();
        let install = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &PruneList::default())
            .unwrap();

        assert_eq!(install.commit, pinned.to_string());
        assert!(!fx.root.path().join("src/NEWS").exists());
    }

    #[test]
    fn test_missing_revision_installs_nothing() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.revision = "v9.99z".to_string();

        let err = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Source(GitError::RevisionNotFound { .. })
        ));
        assert_eq!(err.step(), BuildStep::Checkout);
        assert!(!fx.root.path().join("opt").exists());
    }

    #[test]
    fn test_missing_branch_is_fetch_error() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.branch = "does-not-exist".to_string();

        let err = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();

        assert_eq!(err.step(), BuildStep::Fetch);
    }

    #[test]
    fn test_compile_failure_surfaces_diagnostics() {
        let fx = Fixture::new();
        fx.origin.commit_file(
            "build.sh",
            "echo 'afl-cc.c:12: error: boom' >&2\nexit 3\n",
            "break build",
        );
        let config = fx.config();

        let err = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();

        match &err {
            BuildError::Compile {
                status,
                diagnostics,
                ..
            } => {
                assert_eq!(status, "exit code 3");
                assert!(diagnostics.contains("afl-cc.c:12: error: boom"));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
        // Neither installed nor pruned.
        assert!(!fx.root.path().join("opt").exists());
        assert!(fx.root.path().join("src/qemu_mode").exists());
    }

    #[test]
    fn test_install_failure_skips_prune() {
        let fx = Fixture::new();
        fx.origin.commit_file("install.sh", "exit 1\n", "break install");
        let config = fx.config();

        let err = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();

        assert_eq!(err.step(), BuildStep::Install);
        assert!(fx.root.path().join("src/.git").exists());
    }

    #[test]
    fn test_existing_workdir_requires_force() {
        let fx = Fixture::new();
        let config = fx.config();
        std::fs::create_dir_all(config.workdir.join("stale")).unwrap();
        let source = config.source_ref().unwrap();

        let err = ToolchainBuilder::from_config(&config)
            .build(&source, &fx.toolchain(), &config.prune)
            .unwrap_err();
        assert!(matches!(err, BuildError::WorkdirNotEmpty(_)));

        let install = ToolchainBuilder::from_config(&config)
            .force(true)
            .build(&source, &fx.toolchain(), &config.prune)
            .unwrap();
        assert!(!config.workdir.join("stale").exists());

        // The pruned tree still occupies the workdir.
        let err = ToolchainBuilder::from_config(&config)
            .force(false)
            .build(&source, &fx.toolchain(), &config.prune)
            .unwrap_err();
        assert!(matches!(err, BuildError::WorkdirNotEmpty(_)));
        assert!(install.prefix.exists());
    }

    #[test]
    fn test_existing_prefix_requires_force() {
        let fx = Fixture::new();
        let config = fx.config();
        let builder = ToolchainBuilder::from_config(&config);
        let prefix = builder.prefix_for(&fx.origin.head().to_string());
        std::fs::create_dir_all(&prefix).unwrap();

        let err = builder
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();
        assert!(matches!(err, BuildError::PrefixExists(ref p) if *p == prefix));
    }

    #[test]
    fn test_missing_wrapper() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.wrappers.push(WrapperSpec {
            alias: "afl-ld".to_string(),
            binary: "afl-ld-lto".to_string(),
            symlink_to: None,
            priority: 100,
        });

        let err = ToolchainBuilder::from_config(&config)
            .build(&config.source_ref().unwrap(), &fx.toolchain(), &config.prune)
            .unwrap_err();
        assert_eq!(err.step(), BuildStep::Wrappers);
    }

    #[test]
    fn test_escaping_prune_entry_rejected_before_clone() {
        let fx = Fixture::new();
        let config = fx.config();
        let err = ToolchainBuilder::from_config(&config)
            .build(
                &config.source_ref().unwrap(),
                &fx.toolchain(),
                &PruneList::new(["../outside"]),
            )
            .unwrap_err();

        assert!(matches!(err, BuildError::Prune(PruneError::OutsideWorkdir(_))));
        assert!(!config.workdir.exists());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        let source = config.source_ref().unwrap();
        assert_eq!(source.branch(), "stable");
        assert_eq!(source.revision(), "v4.21c");
        assert!(config.prune.entries().contains(&PathBuf::from(".git")));
    }
}
