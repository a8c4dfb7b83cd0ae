//! `fuzzenv lint` command

use anyhow::Result;

use crate::cli::LintArgs;
use fuzzenv::lint::{LintGate, LintOutcome, ProcessStageRunner};
use fuzzenv::util::shell::Status;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: LintArgs) -> Result<i32> {
    let config = &ctx.config().lint;
    let files = if args.files.is_empty() {
        config.resolve_files(ctx.cwd())?
    } else {
        args.files
    };

    let shell = ctx.shell();
    let mut gate = LintGate::new(config, ProcessStageRunner::with_cwd(ctx.cwd()))?;
    let outcome = gate.run_with(&files, &mut |stage| {
        shell.status(Status::Checking, format!("{} ({} files)", stage, files.len()))
    })?;

    match outcome {
        LintOutcome::Pass => {
            shell.status(Status::Passed, format!("{} files", files.len()));
            Ok(0)
        }
        LintOutcome::Fail { stage, diagnostics } => {
            if !diagnostics.is_empty() {
                println!("{}", diagnostics);
            }
            shell.status(Status::Failed, format!("{} stage", stage));
            Ok(1)
        }
    }
}
