//! Priority-based alternatives registry.
//!
//! Maps a logical tool name (an *alias*, e.g. `cc`) to one of several
//! installed implementations. The active candidate is:
//!
//! 1. the pinned candidate, if the alias is in manual mode;
//! 2. otherwise the candidate with the highest priority;
//! 3. among equal priorities, the most recently registered one.
//!
//! So registering a second candidate at the same priority supersedes the
//! first, as with `update-alternatives`.
//!
//! The registry is a plain value owned by the provisioning session. It is
//! not safe for two sessions to mutate the same persisted registry at once;
//! the last one to save wins.

mod link;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use link::materialize;

static ALIAS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").expect("valid alias regex"));

/// Priority used by the reference deployment for every alias.
pub const DEFAULT_PRIORITY: i32 = 100;

/// `resolve` was called on an alias with no registered candidates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no alternatives registered for `{alias}`")]
pub struct UnresolvedAliasError {
    pub alias: String,
}

/// Errors from mutating the registry.
#[derive(Debug, Error)]
pub enum AlternativesError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedAliasError),

    #[error("invalid alias name `{0}`")]
    InvalidAlias(String),

    #[error("`{path}` is not a registered candidate for `{alias}`")]
    UnknownCandidate { alias: String, path: PathBuf },

    #[error("failed to link `{link}` -> `{target}`")]
    Link {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A concrete implementation registered for an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub priority: i32,
    /// Registration sequence number; larger means more recent.
    pub seq: u64,
}

/// All candidates registered for one alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAlias {
    /// Manual override; wins over priority while set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<PathBuf>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl ToolAlias {
    /// The candidate that resolution currently selects.
    pub fn active(&self) -> Option<&Candidate> {
        if let Some(pinned) = &self.pinned {
            if let Some(c) = self.candidates.iter().find(|c| &c.path == pinned) {
                return Some(c);
            }
        }
        self.candidates
            .iter()
            .max_by_key(|c| (c.priority, c.seq))
    }

    pub fn is_manual(&self) -> bool {
        self.pinned.is_some()
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new candidate was added.
    Added,
    /// An existing candidate got a new priority.
    Updated,
    /// Same path and priority were already registered.
    Unchanged,
    /// An existing candidate was made the most recent one.
    Refreshed,
}

/// The alternatives table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativesRegistry {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    aliases: BTreeMap<String, ToolAlias>,
}

impl AlternativesRegistry {
    pub fn new() -> Self {
        AlternativesRegistry::default()
    }

    /// Install or update a candidate for `alias`.
    ///
    /// Re-registering an identical (path, priority) pair leaves resolution
    /// untouched. Changing the priority of a known path counts as a fresh
    /// registration for tie-breaking.
    pub fn register(
        &mut self,
        alias: &str,
        path: impl Into<PathBuf>,
        priority: i32,
    ) -> Result<Registration, AlternativesError> {
        self.upsert(alias, path.into(), priority, false)
    }

    /// Register `path` and make it the most recent candidate of `alias`.
    ///
    /// Unlike [`register`](Self::register), an identical pair is moved ahead
    /// of its equal-priority peers. Used for freshly installed wrappers, which
    /// must win ties against wrappers of older installs.
    pub fn promote(
        &mut self,
        alias: &str,
        path: impl Into<PathBuf>,
        priority: i32,
    ) -> Result<Registration, AlternativesError> {
        self.upsert(alias, path.into(), priority, true)
    }

    fn upsert(
        &mut self,
        alias: &str,
        path: PathBuf,
        priority: i32,
        refresh: bool,
    ) -> Result<Registration, AlternativesError> {
        validate_alias(alias)?;
        let seq = self.next_seq;

        let entry = self.aliases.entry(alias.to_string()).or_default();
        let outcome = match entry.candidates.iter_mut().find(|c| c.path == path) {
            Some(existing) if existing.priority == priority => {
                // Already the newest candidate; nothing to move.
                if refresh && existing.seq + 1 != seq {
                    existing.seq = seq;
                    Registration::Refreshed
                } else {
                    Registration::Unchanged
                }
            }
            Some(existing) => {
                existing.priority = priority;
                existing.seq = seq;
                Registration::Updated
            }
            None => {
                entry.candidates.push(Candidate {
                    path: path.clone(),
                    priority,
                    seq,
                });
                Registration::Added
            }
        };

        if outcome != Registration::Unchanged {
            self.next_seq += 1;
            tracing::debug!(alias, path = %path.display(), priority, ?outcome, "registered alternative");
        }

        Ok(outcome)
    }

    /// Return the active candidate path for `alias`.
    ///
    /// The returned path is an owned snapshot; later registrations do not
    /// change values a caller has already captured.
    pub fn resolve(&self, alias: &str) -> Result<PathBuf, UnresolvedAliasError> {
        self.aliases
            .get(alias)
            .and_then(ToolAlias::active)
            .map(|c| c.path.clone())
            .ok_or_else(|| UnresolvedAliasError {
                alias: alias.to_string(),
            })
    }

    /// Force `alias` to resolve to `path` regardless of priority.
    pub fn pin(&mut self, alias: &str, path: &Path) -> Result<(), AlternativesError> {
        let entry = self.aliases.get_mut(alias).ok_or_else(|| UnresolvedAliasError {
            alias: alias.to_string(),
        })?;

        if !entry.candidates.iter().any(|c| c.path == path) {
            return Err(AlternativesError::UnknownCandidate {
                alias: alias.to_string(),
                path: path.to_path_buf(),
            });
        }

        entry.pinned = Some(path.to_path_buf());
        tracing::debug!(alias, path = %path.display(), "pinned alternative");
        Ok(())
    }

    /// Return `alias` to automatic (priority-based) selection.
    pub fn unpin(&mut self, alias: &str) -> Result<(), UnresolvedAliasError> {
        let entry = self.aliases.get_mut(alias).ok_or_else(|| UnresolvedAliasError {
            alias: alias.to_string(),
        })?;
        entry.pinned = None;
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<&ToolAlias> {
        self.aliases.get(alias)
    }

    /// Candidates of `alias` in resolution order (ignoring any pin).
    pub fn candidates(&self, alias: &str) -> Vec<&Candidate> {
        let mut list: Vec<&Candidate> = self
            .aliases
            .get(alias)
            .map(|a| a.candidates.iter().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| (b.priority, b.seq).cmp(&(a.priority, a.seq)));
        list
    }

    /// Registered alias names in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Every alias paired with its active path.
    pub fn active_bindings(&self) -> Vec<(&str, &Path)> {
        self.aliases
            .iter()
            .filter_map(|(name, alias)| alias.active().map(|c| (name.as_str(), c.path.as_path())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn validate_alias(alias: &str) -> Result<(), AlternativesError> {
    if ALIAS_NAME.is_match(alias) {
        Ok(())
    } else {
        Err(AlternativesError::InvalidAlias(alias.to_string()))
    }
}
