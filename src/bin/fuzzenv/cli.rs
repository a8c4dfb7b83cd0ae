//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use fuzzenv::util::shell::ColorChoice;

/// fuzzenv - provision a sanitizer-instrumented fuzzing toolchain
#[derive(Parser)]
#[command(name = "fuzzenv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Path to the config file (defaults to ./fuzzenv.toml if present)
    #[arg(long, global = true, env = "FUZZENV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the session state file
    #[arg(long, global = true, env = "FUZZENV_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register aliases, build the engine and compose the environment
    Provision(ProvisionArgs),

    /// Inspect and change compiler alternatives
    Alternatives(AlternativesArgs),

    /// Build and install the fuzzing engine only
    Build(BuildArgs),

    /// Print the compilation environment
    Env(EnvArgs),

    /// Run a command inside the compilation environment
    Exec(ExecArgs),

    /// Run the format, type-check and lint gate
    Lint(LintArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ProvisionArgs {
    /// Reuse the recorded engine installation instead of building
    #[arg(long)]
    pub skip_build: bool,

    /// Rebuild even if already installed, replacing the working directory
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct AlternativesArgs {
    #[command(subcommand)]
    pub command: AlternativesCommands,
}

#[derive(Subcommand)]
pub enum AlternativesCommands {
    /// Register a candidate for an alias
    Install {
        alias: String,
        path: PathBuf,
        #[arg(allow_negative_numbers = true)]
        priority: i32,
    },

    /// Pin an alias to one of its candidates
    Set { alias: String, path: PathBuf },

    /// Return an alias to priority-based selection
    Auto { alias: String },

    /// Show the candidates of an alias
    Query { alias: String },

    /// List every alias and its active candidate
    List,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Replace an existing working directory or install prefix
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct EnvArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = EnvFormat::Shell)]
    pub format: EnvFormat,

    /// Compose from the current config instead of the recorded profile
    #[arg(long)]
    pub recompose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EnvFormat {
    Shell,
    Json,
}

#[derive(Args)]
pub struct ExecArgs {
    /// Command and arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct LintArgs {
    /// Files to check (defaults to the configured globs)
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
