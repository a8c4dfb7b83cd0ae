//! Git checkout of a pinned engine revision.
//!
//! The sequence mirrors what a careful shell script would do: clone the
//! repository, fetch the branch so a moved head is picked up, then check out
//! the pinned revision, refusing revisions that are not part of the
//! branch's history.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, Direction, FetchOptions, Oid, Repository};
use thiserror::Error;

use crate::core::SourceRef;

/// Errors while acquiring the engine source.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to clone {url}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to fetch branch `{branch}`: {message}")]
    Fetch { branch: String, message: String },

    #[error("revision `{revision}` not found on branch `{branch}`: {detail}")]
    RevisionNotFound {
        revision: String,
        branch: String,
        detail: String,
    },

    #[error("failed to check out `{revision}`")]
    Checkout {
        revision: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to update submodule `{name}`")]
    Submodule {
        name: String,
        #[source]
        source: git2::Error,
    },
}

/// A cloned working tree of the engine repository.
pub struct GitWorktree {
    repo: Repository,
    path: PathBuf,
}

impl GitWorktree {
    /// Clone `source`'s repository into `path`.
    pub fn clone(source: &SourceRef, path: &Path) -> Result<Self, GitError> {
        let url = source.repository().as_str();
        tracing::info!(url, path = %path.display(), "cloning engine source");

        let repo = RepoBuilder::new()
            .clone(url, path)
            .map_err(|source| GitError::Clone {
                url: url.to_string(),
                source,
            })?;

        Ok(GitWorktree {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch `branch` from origin and fast-forward the local branch to it.
    ///
    /// Returns the branch tip after the fetch.
    pub fn fetch_branch(&self, branch: &str) -> Result<Oid, GitError> {
        let fetch_err = |message: String| GitError::Fetch {
            branch: branch.to_string(),
            message,
        };

        let mut remote = self
            .repo
            .find_remote("origin")
            .map_err(|e| fetch_err(e.message().to_string()))?;

        let head_ref = format!("refs/heads/{}", branch);
        remote
            .connect(Direction::Fetch)
            .map_err(|e| fetch_err(e.message().to_string()))?;
        let exists = remote
            .list()
            .map_err(|e| fetch_err(e.message().to_string()))?
            .iter()
            .any(|head| head.name() == head_ref);
        remote
            .disconnect()
            .map_err(|e| fetch_err(e.message().to_string()))?;

        if !exists {
            return Err(fetch_err("branch does not exist upstream".to_string()));
        }

        let refspec = format!("+{}:refs/remotes/origin/{}", head_ref, branch);
        let mut opts = FetchOptions::new();
        opts.download_tags(AutotagOption::All);
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(|e| fetch_err(e.message().to_string()))?;

        let tip = self
            .repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| fetch_err(e.message().to_string()))?
            .id();

        self.repo
            .reference(&head_ref, tip, true, "fuzzenv: fast-forward")
            .map_err(|e| fetch_err(e.message().to_string()))?;

        tracing::debug!(branch, tip = %tip, "fetched branch");
        Ok(tip)
    }

    /// Check out `revision`, which must be `tip` or one of its ancestors.
    ///
    /// Leaves HEAD detached at the revision's commit and returns its id.
    pub fn checkout_revision(
        &self,
        revision: &str,
        branch: &str,
        tip: Oid,
    ) -> Result<Oid, GitError> {
        let not_found = |detail: String| GitError::RevisionNotFound {
            revision: revision.to_string(),
            branch: branch.to_string(),
            detail,
        };

        let commit = self
            .repo
            .revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| not_found(e.message().to_string()))?;

        let reachable = commit.id() == tip
            || self
                .repo
                .graph_descendant_of(tip, commit.id())
                .map_err(|e| not_found(e.message().to_string()))?;
        if !reachable {
            return Err(not_found(format!(
                "commit {} is not an ancestor of {}",
                commit.id(),
                tip
            )));
        }

        let checkout_err = |source| GitError::Checkout {
            revision: revision.to_string(),
            source,
        };
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(checkout_err)?;
        self.repo.set_head_detached(commit.id()).map_err(checkout_err)?;

        tracing::debug!(revision, commit = %commit.id(), "checked out revision");
        Ok(commit.id())
    }

    /// Initialise and update all submodules, recursively, at the commits
    /// recorded by the current checkout.
    pub fn update_submodules(&self) -> Result<usize, GitError> {
        update_submodules(&self.repo)
    }
}

fn update_submodules(repo: &Repository) -> Result<usize, GitError> {
    let submodules = repo.submodules().map_err(|source| GitError::Submodule {
        name: "*".to_string(),
        source,
    })?;

    let mut count = 0;
    for mut sub in submodules {
        let name = sub.name().unwrap_or("<unnamed>").to_string();
        let err = |source| GitError::Submodule {
            name: name.clone(),
            source,
        };
        sub.update(true, None).map_err(err)?;
        let nested = sub.open().map_err(err)?;
        count += 1 + update_submodules(&nested)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OriginRepo;
    use tempfile::TempDir;

    fn source(origin: &OriginRepo, branch: &str, rev: &str) -> SourceRef {
        SourceRef::new(&origin.url(), branch, rev).unwrap()
    }

    #[test]
    fn test_checkout_tag_on_branch() {
        let origin = OriginRepo::new();
        let first = origin.head();
        origin.tag("v1.0", first);
        origin.commit_file("NEWS", "moved ahead\n", "second");

        let tmp = TempDir::new().unwrap();
        let src = source(&origin, "main", "v1.0");
        let wt = GitWorktree::clone(&src, &tmp.path().join("engine")).unwrap();
        let tip = wt.fetch_branch("main").unwrap();
        assert_eq!(tip, origin.head());

        let checked = wt.checkout_revision("v1.0", "main", tip).unwrap();
        assert_eq!(checked, first);
        assert!(!wt.path().join("NEWS").exists());
    }

    #[test]
    fn test_fetch_picks_up_moved_branch() {
        let origin = OriginRepo::new();
        let tmp = TempDir::new().unwrap();
        let src = source(&origin, "main", "HEAD");
        let wt = GitWorktree::clone(&src, &tmp.path().join("engine")).unwrap();

        let moved = origin.commit_file("NEWS", "after clone\n", "later");
        let tip = wt.fetch_branch("main").unwrap();
        assert_eq!(tip, moved);

        let by_id = wt
            .checkout_revision(&moved.to_string()[..10], "main", tip)
            .unwrap();
        assert_eq!(by_id, moved);
    }

    #[test]
    fn test_missing_branch_is_fetch_error() {
        let origin = OriginRepo::new();
        let tmp = TempDir::new().unwrap();
        let src = source(&origin, "nope", "HEAD");
        let wt = GitWorktree::clone(&src, &tmp.path().join("engine")).unwrap();

        assert!(matches!(
            wt.fetch_branch("nope"),
            Err(GitError::Fetch { .. })
        ));
    }

    #[test]
    fn test_revision_off_branch_not_found() {
        let origin = OriginRepo::new();
        let side = origin.commit_on_branch("side", "side work");
        origin.tag("side-tag", side);

        let tmp = TempDir::new().unwrap();
        let src = source(&origin, "main", "side-tag");
        let wt = GitWorktree::clone(&src, &tmp.path().join("engine")).unwrap();
        let tip = wt.fetch_branch("main").unwrap();

        assert!(matches!(
            wt.checkout_revision("side-tag", "main", tip),
            Err(GitError::RevisionNotFound { .. })
        ));
        assert!(matches!(
            wt.checkout_revision("v9.99c", "main", tip),
            Err(GitError::RevisionNotFound { .. })
        ));
    }

    #[test]
    fn test_clone_missing_repository() {
        let tmp = TempDir::new().unwrap();
        let missing = url::Url::from_file_path(tmp.path().join("does-not-exist")).unwrap();
        let src = SourceRef::new(missing.as_str(), "main", "HEAD").unwrap();

        assert!(matches!(
            GitWorktree::clone(&src, &tmp.path().join("engine")),
            Err(GitError::Clone { .. })
        ));
    }
}
