//! Session state I/O.
//!
//! The state file carries everything one provisioning session hands to the
//! next CLI invocation: the alternatives table, the last promoted engine
//! installation and the profile composed from it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::alternatives::AlternativesRegistry;
use crate::builder::Installation;
use crate::core::EnvironmentProfile;
use crate::util::fs::{read_to_string, write_string};

pub const STATE_VERSION: u32 = 1;

/// Persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub version: u32,
    pub registry: AlternativesRegistry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<EnvironmentProfile>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            version: STATE_VERSION,
            registry: AlternativesRegistry::new(),
            installation: None,
            profile: None,
        }
    }
}

/// Load the session at `path`; a missing file is a fresh session.
pub fn load_state(path: &Path) -> Result<SessionState> {
    if !path.exists() {
        return Ok(SessionState::default());
    }

    let contents = read_to_string(path)?;
    let state: SessionState = toml::from_str(&contents)
        .with_context(|| format!("failed to parse session state: {}", path.display()))?;

    if state.version != STATE_VERSION {
        bail!(
            "session state version {} is not compatible with this version of fuzzenv",
            state.version
        );
    }
    Ok(state)
}

/// Atomically replace the session at `path`.
pub fn save_state(path: &Path, state: &SessionState) -> Result<()> {
    let contents =
        toml::to_string_pretty(state).context("failed to serialize session state")?;
    write_string(path, &contents)?;
    tracing::debug!(path = %path.display(), "saved session state");
    Ok(())
}
