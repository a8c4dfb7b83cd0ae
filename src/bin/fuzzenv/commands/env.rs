//! `fuzzenv env` command

use anyhow::{Context, Result};

use crate::cli::{EnvArgs, EnvFormat};
use fuzzenv::core::EnvironmentProfile;
use fuzzenv::env::EnvironmentComposer;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: EnvArgs) -> Result<i32> {
    let profile = current_profile(ctx, args.recompose)?;

    match args.format {
        EnvFormat::Shell => print!("{}", profile.to_shell_script()),
        EnvFormat::Json => println!("{}", profile.to_json()),
    }
    Ok(0)
}

/// The recorded profile, or a fresh composition from config and session.
pub fn current_profile(ctx: &GlobalContext, recompose: bool) -> Result<EnvironmentProfile> {
    let state = ctx.load_state()?;

    if recompose {
        let prefix = state.installation.as_ref().map(|i| i.prefix.as_path());
        let bound = ctx.config().environment.bind(&state.registry, prefix)?;
        return Ok(EnvironmentComposer::compose(&bound)?);
    }

    state.profile.with_context(|| {
        format!(
            "no environment recorded in {}; run `fuzzenv provision` or pass --recompose",
            ctx.state_path().display()
        )
    })
}
