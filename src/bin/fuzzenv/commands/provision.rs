//! `fuzzenv provision` command

use anyhow::Result;

use super::Progress;
use crate::cli::ProvisionArgs;
use fuzzenv::ops::{provision, ProvisionOptions};
use fuzzenv::util::shell::Status;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: ProvisionArgs) -> Result<i32> {
    let opts = ProvisionOptions {
        skip_build: args.skip_build,
        force: args.force,
    };

    if args.force {
        ctx.shell().warn(format!(
            "--force replaces {} and any existing install prefix",
            ctx.config().engine.workdir.display()
        ));
    }

    let report = {
        let mut progress = Progress::new(ctx.shell());
        provision(ctx.config(), ctx.state_path(), &opts, &mut progress)?
    };

    let shell = ctx.shell();
    if let Some(installation) = &report.installation {
        if report.built {
            shell.status(
                Status::Installed,
                format!("{} at {}", installation.source, installation.prefix.display()),
            );
            shell.status(
                Status::Pruned,
                format!(
                    "{} paths, {} bytes freed",
                    installation.prune.removed.len(),
                    installation.prune.freed_bytes
                ),
            );
        }
        for wrapper in &installation.wrappers {
            shell.status(
                Status::Registered,
                format!("{} -> {}", wrapper.alias, wrapper.path.display()),
            );
        }
    }
    if let Some(path) = &report.env_file {
        shell.note(format!("environment written to {}", path.display()));
    }
    shell.status(
        Status::Finished,
        format!("{} variables, digest {}", report.profile.len(), &report.profile.digest()[..12]),
    );

    Ok(0)
}
