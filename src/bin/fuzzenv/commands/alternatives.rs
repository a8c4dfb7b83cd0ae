//! `fuzzenv alternatives` command

use anyhow::Result;

use super::save_session;
use crate::cli::{AlternativesArgs, AlternativesCommands};
use fuzzenv::alternatives::{Registration, UnresolvedAliasError};
use fuzzenv::util::shell::Status;
use fuzzenv::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: AlternativesArgs) -> Result<i32> {
    let mut state = ctx.load_state()?;
    let shell = ctx.shell();

    match args.command {
        AlternativesCommands::Install {
            alias,
            path,
            priority,
        } => {
            let outcome = state.registry.register(&alias, &path, priority)?;
            if outcome == Registration::Unchanged {
                shell.note(format!("{} -> {} already registered", alias, path.display()));
                return Ok(0);
            }
            save_session(ctx, &state)?;
            shell.status(
                Status::Registered,
                format!("{} -> {} (priority {})", alias, path.display(), priority),
            );
        }

        AlternativesCommands::Set { alias, path } => {
            state.registry.pin(&alias, &path)?;
            save_session(ctx, &state)?;
            shell.status(
                Status::Registered,
                format!("{} -> {} (manual)", alias, path.display()),
            );
        }

        AlternativesCommands::Auto { alias } => {
            state.registry.unpin(&alias)?;
            let active = state.registry.resolve(&alias)?;
            save_session(ctx, &state)?;
            shell.status(
                Status::Registered,
                format!("{} -> {} (auto)", alias, active.display()),
            );
        }

        AlternativesCommands::Query { alias } => {
            let entry = state
                .registry
                .get(&alias)
                .ok_or_else(|| UnresolvedAliasError {
                    alias: alias.clone(),
                })?;
            let value = state.registry.resolve(&alias)?;

            println!("alias: {}", alias);
            println!("mode: {}", if entry.is_manual() { "manual" } else { "auto" });
            println!("value: {}", value.display());
            println!("candidates:");
            for candidate in state.registry.candidates(&alias) {
                println!(
                    "  {} priority {}",
                    candidate.path.display(),
                    candidate.priority
                );
            }
        }

        AlternativesCommands::List => {
            for alias in state.registry.aliases() {
                let Some(entry) = state.registry.get(alias) else {
                    continue;
                };
                let Some(active) = entry.active() else {
                    continue;
                };
                println!(
                    "{:<24} {}{}",
                    alias,
                    active.path.display(),
                    if entry.is_manual() { " (manual)" } else { "" }
                );
            }
        }
    }

    Ok(0)
}
