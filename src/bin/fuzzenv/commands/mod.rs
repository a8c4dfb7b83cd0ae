//! Command implementations

pub mod alternatives;
pub mod build;
pub mod completions;
pub mod env;
pub mod exec;
pub mod lint;
pub mod provision;

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use fuzzenv::alternatives::materialize;
use fuzzenv::builder::{BuildStep, Installation};
use fuzzenv::ops::{ProvisionObserver, SessionState, Stage};
use fuzzenv::util::shell::Status;
use fuzzenv::util::{GlobalContext, Shell};

/// Turns build and pipeline progress into status lines and spinners.
pub struct Progress<'a> {
    shell: &'a Shell,
    spinner: Option<ProgressBar>,
}

impl<'a> Progress<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Progress {
            shell,
            spinner: None,
        }
    }

    pub fn step(&mut self, step: BuildStep) {
        self.finish();
        let (status, msg) = match step {
            BuildStep::Prepare => return,
            BuildStep::Clone => (Status::Cloning, "engine source"),
            BuildStep::Fetch => (Status::Fetching, "branch and tags"),
            BuildStep::Checkout => (Status::Checkout, "pinned revision"),
            BuildStep::Submodules => (Status::Fetching, "submodules"),
            BuildStep::Compile => (Status::Compiling, "engine"),
            BuildStep::Install => (Status::Installing, "engine"),
            BuildStep::Wrappers => (Status::Checking, "compiler wrappers"),
            BuildStep::Prune => (Status::Pruning, "working tree"),
        };
        match step {
            BuildStep::Clone | BuildStep::Compile => {
                self.spinner = self.shell.spinner(status, msg);
            }
            _ => self.shell.status(status, msg),
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl ProvisionObserver for Progress<'_> {
    fn stage(&mut self, stage: Stage) {
        self.finish();
        if stage == Stage::Compose {
            self.shell.status(Status::Composing, "environment");
        }
    }

    fn build_step(&mut self, step: BuildStep) {
        self.step(step);
    }

    fn reused(&mut self, installation: &Installation) {
        self.shell.status(
            Status::Skipped,
            format!(
                "build, {} is installed at {}",
                installation.source,
                installation.prefix.display()
            ),
        );
    }
}

/// Refresh the alias links if a link directory is set, then save `state`.
pub fn save_session(ctx: &GlobalContext, state: &SessionState) -> Result<()> {
    if let Some(dir) = &ctx.config().alternatives.link_dir {
        materialize(&state.registry, dir)
            .with_context(|| format!("failed to update links in {}", dir.display()))?;
    }
    ctx.save_state(state)
}
