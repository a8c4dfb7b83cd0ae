//! fuzzenv CLI - provision a sanitizer-instrumented fuzzing toolchain

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use fuzzenv::util::{GlobalContext, Shell};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("fuzzenv=debug")
    } else if cli.quiet {
        EnvFilter::new("fuzzenv=error")
    } else {
        EnvFilter::new("fuzzenv=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color);
    let context = || GlobalContext::new(cli.config.as_deref(), cli.state.clone(), shell);

    // Execute command
    match cli.command {
        Commands::Provision(args) => commands::provision::execute(&context()?, args),
        Commands::Alternatives(args) => commands::alternatives::execute(&context()?, args),
        Commands::Build(args) => commands::build::execute(&context()?, args),
        Commands::Env(args) => commands::env::execute(&context()?, args),
        Commands::Exec(args) => commands::exec::execute(&context()?, args),
        Commands::Lint(args) => commands::lint::execute(&context()?, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
