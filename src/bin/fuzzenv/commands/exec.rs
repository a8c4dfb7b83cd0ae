//! `fuzzenv exec` command

use anyhow::{Context, Result};

use super::env::current_profile;
use crate::cli::ExecArgs;
use fuzzenv::util::process::ProcessBuilder;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: ExecArgs) -> Result<i32> {
    let profile = current_profile(ctx, false)?;
    let pb = ProcessBuilder::from_argv(&args.command)
        .context("no command given")?
        .envs(profile.iter())
        .cwd(ctx.cwd());

    tracing::debug!(command = %pb.display_command(), "running in environment");
    let status = pb.status()?;
    Ok(status.code().unwrap_or(1))
}
