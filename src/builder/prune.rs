//! Post-install pruning of the engine working tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::fs::{disk_usage, is_contained_relative};

/// Error removing a prune entry.
#[derive(Debug, Error)]
pub enum PruneError {
    #[error("prune entry `{0}` escapes the working directory")]
    OutsideWorkdir(PathBuf),

    #[error("failed to remove `{path}`")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Paths, relative to the working tree, to delete once install succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PruneList {
    entries: Vec<PathBuf>,
}

impl PruneList {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        PruneList {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Reject entries that are absolute or climb out with `..`.
    pub fn validate(&self) -> Result<(), PruneError> {
        match self.entries.iter().find(|e| !is_contained_relative(e)) {
            Some(bad) => Err(PruneError::OutsideWorkdir(bad.clone())),
            None => Ok(()),
        }
    }
}

/// What a prune pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
    pub freed_bytes: u64,
}

/// Delete every entry of `list` below `root`.
///
/// Missing entries count as already pruned. A present entry that cannot be
/// removed stops the pass with [`PruneError::Remove`].
pub(crate) fn prune(root: &Path, list: &PruneList) -> Result<PruneReport, PruneError> {
    list.validate()?;
    let mut report = PruneReport::default();

    for entry in list.entries() {
        let path = root.join(entry);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "prune entry already absent");
                report.absent.push(entry.clone());
                continue;
            }
            Err(source) => return Err(PruneError::Remove { path, source }),
        };

        let size = if meta.is_dir() { disk_usage(&path) } else { meta.len() };
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = size, "pruned");
                report.freed_bytes += size;
                report.removed.push(entry.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.absent.push(entry.clone()),
            Err(source) => return Err(PruneError::Remove { path, source }),
        }
    }

    Ok(report)
}
