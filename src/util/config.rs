//! Configuration file support for fuzzenv.
//!
//! Settings are read from `fuzzenv.toml` in the current directory, or from
//! the file given with `--config`. Every section is optional and defaults to
//! the reference deployment: clang-19 and gcc-14 alternatives, an AFL++
//! engine build, and an ASan+UBSan environment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::alternatives::DEFAULT_PRIORITY;
use crate::builder::EngineConfig;
use crate::env::EnvironmentConfig;
use crate::lint::LintConfig;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE: &str = "fuzzenv.toml";

/// fuzzenv configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub alternatives: AlternativesConfig,
    pub engine: EngineConfig,
    pub environment: EnvironmentConfig,
    pub lint: LintConfig,
    pub session: SessionConfig,
}

/// Candidates registered at the start of provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternativesConfig {
    /// Directory receiving one symlink per alias after provisioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_dir: Option<PathBuf>,

    pub aliases: Vec<AliasEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    pub path: PathBuf,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl AliasEntry {
    fn new(alias: &str, path: &str) -> Self {
        AliasEntry {
            alias: alias.to_string(),
            path: PathBuf::from(path),
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl Default for AlternativesConfig {
    fn default() -> Self {
        AlternativesConfig {
            link_dir: None,
            aliases: vec![
                AliasEntry::new("clang", "/usr/bin/clang-19"),
                AliasEntry::new("clang++", "/usr/bin/clang++-19"),
                AliasEntry::new("llvm-config", "/usr/bin/llvm-config-19"),
                AliasEntry::new("cc", "/usr/bin/clang-19"),
                AliasEntry::new("c++", "/usr/bin/clang++-19"),
                AliasEntry::new("gcc", "/usr/bin/gcc-14"),
                AliasEntry::new("g++", "/usr/bin/g++-14"),
                AliasEntry::new("x86_64-linux-gnu-gcc", "/usr/bin/x86_64-linux-gnu-gcc-14"),
            ],
        }
    }
}

/// Where session state and the rendered environment go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Shell script of `export` lines written after provisioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load `explicit` if given, else `fuzzenv.toml` under `cwd` if present,
    /// else defaults.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = cwd.join(CONFIG_FILE);
        if local.exists() {
            tracing::debug!(path = %local.display(), "using local config");
            Self::load(&local)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings no stage could run with.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.alternatives.aliases {
            if entry.alias.is_empty() {
                bail!("alternatives entry for `{}` has an empty alias", entry.path.display());
            }
        }
        if self.engine.build_command.is_empty() {
            bail!("engine.build_command must not be empty");
        }
        if self.engine.install_command.is_empty() {
            bail!("engine.install_command must not be empty");
        }
        self.engine.prune.validate()?;
        self.engine
            .source_ref()
            .context("invalid engine source")?;
        self.environment.validate()?;
        self.lint.validate()?;
        Ok(())
    }

    /// Session state file, defaulting to the per-user data directory.
    pub fn state_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.session.state_file {
            return Ok(path.clone());
        }
        default_state_path().context("could not determine a data directory; set session.state_file")
    }
}

/// `<data dir>/fuzzenv/session.toml`.
pub fn default_state_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fuzzenv").map(|d| d.data_dir().join("session.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.alternatives.aliases.len(), 8);
        assert!(config
            .alternatives
            .aliases
            .iter()
            .all(|a| a.priority == DEFAULT_PRIORITY));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[engine]
revision = "v4.30c"
jobs = 4

[environment]
sanitizers = ["address"]

[[alternatives.aliases]]
alias = "cc"
path = "/usr/bin/gcc-14"
"#,
        )
        .unwrap();

        let config = Config::discover(None, tmp.path()).unwrap();
        assert_eq!(config.engine.revision, "v4.30c");
        assert_eq!(config.engine.branch, "stable");
        assert_eq!(config.engine.jobs, Some(4));
        assert_eq!(config.environment.sanitizers.len(), 1);
        assert_eq!(config.environment.compiler, "afl-cc");
        assert_eq!(config.alternatives.aliases.len(), 1);
        assert_eq!(config.alternatives.aliases[0].priority, 100);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(Config::discover(Some(&missing), tmp.path()).is_err());
        assert_eq!(Config::discover(None, tmp.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.engine.build_command.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.environment.debug_var = "1BAD".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.prune = crate::builder::PruneList::new(["/etc"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_explicit_state_path() {
        let mut config = Config::default();
        config.session.state_file = Some(PathBuf::from("/tmp/state.toml"));
        assert_eq!(config.state_path().unwrap(), PathBuf::from("/tmp/state.toml"));
    }
}
