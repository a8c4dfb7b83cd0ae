//! Global context for fuzzenv commands.
//!
//! Provides centralized access to the loaded configuration, the session
//! state file and the status shell.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::ops::state::{load_state, save_state, SessionState};
use crate::util::config::Config;
use crate::util::shell::Shell;

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct GlobalContext {
    cwd: PathBuf,
    config: Config,
    state_path: PathBuf,
    shell: Shell,
}

impl GlobalContext {
    /// Load configuration relative to the current directory.
    ///
    /// `config_path` and `state_path` override the discovered config file
    /// and `session.state_file` respectively.
    pub fn new(
        config_path: Option<&Path>,
        state_path: Option<PathBuf>,
        shell: Shell,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd, config_path, state_path, shell)
    }

    pub fn with_cwd(
        cwd: PathBuf,
        config_path: Option<&Path>,
        state_path: Option<PathBuf>,
        shell: Shell,
    ) -> Result<Self> {
        let config = Config::discover(config_path, &cwd)?;
        let state_path = match state_path {
            Some(path) => path,
            None => config.state_path()?,
        };
        tracing::debug!(state = %state_path.display(), "session state location");

        Ok(GlobalContext {
            cwd,
            config,
            state_path,
            shell,
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn load_state(&self) -> Result<SessionState> {
        load_state(&self.state_path)
    }

    pub fn save_state(&self, state: &SessionState) -> Result<()> {
        save_state(&self.state_path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::shell::{ColorChoice, Verbosity};
    use tempfile::TempDir;

    #[test]
    fn test_state_override_wins() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("fuzzenv.toml"),
            "[session]\nstate_file = \"/nonexistent/session.toml\"\n",
        )
        .unwrap();
        let shell = Shell::new(Verbosity::Quiet, ColorChoice::Never);

        let ctx = GlobalContext::with_cwd(
            tmp.path().to_path_buf(),
            None,
            Some(tmp.path().join("s.toml")),
            shell,
        )
        .unwrap();
        assert_eq!(ctx.state_path(), tmp.path().join("s.toml"));

        let shell = Shell::new(Verbosity::Quiet, ColorChoice::Never);
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), None, None, shell).unwrap();
        assert_eq!(ctx.state_path(), Path::new("/nonexistent/session.toml"));
        assert_eq!(ctx.cwd(), tmp.path());
    }
}
