//! Materialize active alternatives as symlinks.

use std::fs;
use std::path::{Path, PathBuf};

use super::{AlternativesError, AlternativesRegistry};
use crate::util::fs::symlink;

/// Point `<link_dir>/<alias>` at the active candidate of every alias.
///
/// Each link is written under a temporary name and renamed over the old
/// one, so a concurrent exec never sees a missing link.
pub fn materialize(
    registry: &AlternativesRegistry,
    link_dir: &Path,
) -> Result<Vec<PathBuf>, AlternativesError> {
    fs::create_dir_all(link_dir).map_err(|source| AlternativesError::Link {
        link: link_dir.to_path_buf(),
        target: PathBuf::new(),
        source,
    })?;

    let mut written = Vec::new();
    for (alias, target) in registry.active_bindings() {
        let link = link_dir.join(alias);
        replace_link(&link, target).map_err(|source| AlternativesError::Link {
            link: link.clone(),
            target: target.to_path_buf(),
            source,
        })?;
        tracing::debug!(link = %link.display(), target = %target.display(), "linked alternative");
        written.push(link);
    }

    Ok(written)
}

fn replace_link(link: &Path, target: &Path) -> std::io::Result<()> {
    if let Ok(current) = fs::read_link(link) {
        if current == target {
            return Ok(());
        }
    }

    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = link.with_file_name(format!(".{}.fuzzenv-tmp", file_name));
    if tmp.symlink_metadata().is_ok() {
        fs::remove_file(&tmp)?;
    }

    symlink(target, &tmp)?;
    fs::rename(&tmp, link)
}
