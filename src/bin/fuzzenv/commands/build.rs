//! `fuzzenv build` command

use anyhow::{Context, Result};

use super::{save_session, Progress};
use crate::cli::BuildArgs;
use fuzzenv::builder::ToolchainBuilder;
use fuzzenv::util::shell::Status;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: BuildArgs) -> Result<i32> {
    let config = ctx.config();
    config.validate()?;
    let engine = &config.engine;
    let source = engine.source_ref().context("invalid engine source")?;

    let mut state = ctx.load_state()?;
    for entry in &config.alternatives.aliases {
        state
            .registry
            .register(&entry.alias, &entry.path, entry.priority)?;
    }
    let toolchain = engine.toolchain.resolve(&state.registry)?;

    if args.force {
        ctx.shell().warn(format!(
            "--force replaces {} and any existing install prefix",
            ctx.config().engine.workdir.display()
        ));
    }

    let installation = {
        let mut progress = Progress::new(ctx.shell());
        ToolchainBuilder::from_config(engine)
            .force(args.force)
            .build_with(&source, &toolchain, &engine.prune, &mut |step| {
                progress.step(step)
            })?
    };

    for wrapper in &installation.wrappers {
        state
            .registry
            .promote(&wrapper.alias, &wrapper.path, wrapper.priority)?;
    }
    let shell = ctx.shell();
    shell.status(
        Status::Installed,
        format!("{} at {}", source, installation.prefix.display()),
    );
    state.installation = Some(installation);
    save_session(ctx, &state)?;

    if state.profile.is_some() {
        shell.note("recorded environment predates this build; run `fuzzenv provision --skip-build`");
    }
    shell.status(Status::Finished, "engine build");
    Ok(0)
}
