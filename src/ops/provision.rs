//! Implementation of `fuzzenv provision`.
//!
//! Runs `Register -> Build -> Promote -> Compose -> Persist`. Each stage
//! consumes the previous stage's output, so the first failure ends the run.
//! Nothing is written until every earlier stage has succeeded, which keeps
//! the previously persisted session authoritative after a failed build.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::alternatives::{materialize, AlternativesRegistry};
use crate::builder::{BuildStep, Installation, ToolchainBuilder};
use crate::core::EnvironmentProfile;
use crate::env::EnvironmentComposer;
use crate::ops::state::{load_state, save_state, SessionState};
use crate::util::fs::write_string;
use crate::util::Config;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    Build,
    Promote,
    Compose,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Register => "register",
            Stage::Build => "build",
            Stage::Promote => "promote",
            Stage::Compose => "compose",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A failed provisioning run, tagged with the stage that failed.
#[derive(Debug, Error)]
#[error("{stage} stage failed")]
pub struct ProvisionError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl ProvisionError {
    fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        ProvisionError {
            stage,
            source: source.into(),
        }
    }
}

/// Options for the provision command.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    /// Use the installation recorded in the session instead of building.
    pub skip_build: bool,

    /// Rebuild even if the configured source is already installed, replacing
    /// an existing working directory or prefix.
    pub force: bool,
}

/// Progress callbacks. All methods default to doing nothing.
pub trait ProvisionObserver {
    fn stage(&mut self, _stage: Stage) {}
    fn build_step(&mut self, _step: BuildStep) {}
    fn reused(&mut self, _installation: &Installation) {}
}

impl ProvisionObserver for () {}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub installation: Option<Installation>,
    /// Whether the engine was built in this run.
    pub built: bool,
    pub profile: EnvironmentProfile,
    pub links: Vec<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Provision the session stored at `state_path`.
pub fn provision(
    config: &Config,
    state_path: &Path,
    opts: &ProvisionOptions,
    observer: &mut dyn ProvisionObserver,
) -> Result<ProvisionReport, ProvisionError> {
    observer.stage(Stage::Register);
    config
        .validate()
        .map_err(|e| ProvisionError::new(Stage::Register, e))?;
    let previous = load_state(state_path).map_err(|e| ProvisionError::new(Stage::Register, e))?;
    let mut registry = previous.registry.clone();
    register_aliases(config, &mut registry)?;

    observer.stage(Stage::Build);
    let (installation, built) = if opts.skip_build {
        tracing::info!("skipping engine build");
        (previous.installation.clone(), false)
    } else {
        build_engine(config, &registry, &previous, opts, observer)?
    };

    observer.stage(Stage::Promote);
    if let Some(installation) = &installation {
        for wrapper in &installation.wrappers {
            registry
                .promote(&wrapper.alias, &wrapper.path, wrapper.priority)
                .map_err(|e| ProvisionError::new(Stage::Promote, e))?;
            tracing::info!(alias = %wrapper.alias, path = %wrapper.path.display(), "promoted wrapper");
            if let Ok(active) = registry.resolve(&wrapper.alias) {
                if active != wrapper.path {
                    tracing::warn!(
                        alias = %wrapper.alias,
                        active = %active.display(),
                        "wrapper is installed but another candidate stays active"
                    );
                }
            }
        }
    }

    observer.stage(Stage::Compose);
    let prefix = installation.as_ref().map(|i| i.prefix.as_path());
    let profile = config
        .environment
        .bind(&registry, prefix)
        .and_then(|bound| EnvironmentComposer::compose(&bound))
        .map_err(|e| ProvisionError::new(Stage::Compose, e))?;
    tracing::info!(vars = profile.len(), digest = %profile.digest(), "composed environment");

    observer.stage(Stage::Persist);
    let state = SessionState {
        registry,
        installation: installation.clone(),
        profile: Some(profile.clone()),
        ..SessionState::default()
    };
    let (links, env_file) =
        persist(config, state_path, &state).map_err(|e| ProvisionError::new(Stage::Persist, e))?;

    Ok(ProvisionReport {
        installation,
        built,
        profile,
        links,
        env_file,
    })
}

fn register_aliases(
    config: &Config,
    registry: &mut AlternativesRegistry,
) -> Result<(), ProvisionError> {
    for entry in &config.alternatives.aliases {
        let outcome = registry
            .register(&entry.alias, &entry.path, entry.priority)
            .map_err(|e| ProvisionError::new(Stage::Register, e))?;
        tracing::debug!(alias = %entry.alias, ?outcome, "registered configured alias");
    }
    Ok(())
}

fn build_engine(
    config: &Config,
    registry: &AlternativesRegistry,
    previous: &SessionState,
    opts: &ProvisionOptions,
    observer: &mut dyn ProvisionObserver,
) -> Result<(Option<Installation>, bool), ProvisionError> {
    let engine = &config.engine;
    let source = engine
        .source_ref()
        .map_err(|e| ProvisionError::new(Stage::Build, e))?;

    if !opts.force {
        if let Some(existing) = &previous.installation {
            if existing.source == source.to_string() && existing.prefix.exists() {
                tracing::info!(prefix = %existing.prefix.display(), "engine already installed");
                observer.reused(existing);
                return Ok((Some(existing.clone()), false));
            }
        }
    }

    let toolchain = engine
        .toolchain
        .resolve(registry)
        .map_err(|e| ProvisionError::new(Stage::Build, e))?;
    tracing::info!(cc = %toolchain.cc.display(), cxx = %toolchain.cxx.display(), "building engine");

    let installation = ToolchainBuilder::from_config(engine)
        .force(opts.force)
        .build_with(&source, &toolchain, &engine.prune, &mut |step| {
            observer.build_step(step)
        })
        .map_err(|e| ProvisionError::new(Stage::Build, e))?;

    Ok((Some(installation), true))
}

fn persist(
    config: &Config,
    state_path: &Path,
    state: &SessionState,
) -> anyhow::Result<(Vec<PathBuf>, Option<PathBuf>)> {
    let links = match &config.alternatives.link_dir {
        Some(dir) => materialize(&state.registry, dir)?,
        None => Vec::new(),
    };

    let env_file = match &config.session.env_file {
        Some(path) => {
            let profile = state.profile.clone().unwrap_or_default();
            write_string(path, &profile.to_shell_script())?;
            Some(path.clone())
        }
        None => None,
    };

    // The session file goes last: until it is replaced, the previous
    // session stays the recorded one.
    save_state(state_path, state)?;

    Ok((links, env_file))
}
