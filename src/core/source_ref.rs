//! Pinned source reference for the fuzzing engine.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Error constructing a [`SourceRef`].
#[derive(Debug, Error)]
pub enum SourceRefError {
    #[error("invalid repository URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("branch name must not be empty")]
    EmptyBranch,

    #[error("revision must not be empty")]
    EmptyRevision,
}

/// A repository, the branch to follow, and the exact revision to build.
///
/// Immutable once constructed. The revision may be a tag or a commit id and
/// must be reachable from the branch tip after fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    repository: Url,
    branch: String,
    revision: String,
}

impl SourceRef {
    pub fn new(
        repository: &str,
        branch: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self, SourceRefError> {
        let url = Url::parse(repository).map_err(|source| SourceRefError::InvalidUrl {
            url: repository.to_string(),
            source,
        })?;

        let branch = branch.into();
        if branch.trim().is_empty() {
            return Err(SourceRefError::EmptyBranch);
        }

        let revision = revision.into();
        if revision.trim().is_empty() {
            return Err(SourceRefError::EmptyRevision);
        }

        Ok(SourceRef {
            repository: url,
            branch,
            revision,
        })
    }

    pub fn repository(&self) -> &Url {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.repository, self.branch, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ref_display() {
        let src = SourceRef::new("https://github.com/AFLplusplus/AFLplusplus", "stable", "v4.21c")
            .unwrap();
        assert_eq!(
            src.to_string(),
            "https://github.com/AFLplusplus/AFLplusplus#stable@v4.21c"
        );
    }

    #[test]
    fn test_source_ref_rejects_bad_input() {
        assert!(matches!(
            SourceRef::new("not a url", "main", "abc"),
            Err(SourceRefError::InvalidUrl { .. })
        ));
        assert!(matches!(
            SourceRef::new("file:///tmp/repo", " ", "abc"),
            Err(SourceRefError::EmptyBranch)
        ));
        assert!(matches!(
            SourceRef::new("file:///tmp/repo", "main", ""),
            Err(SourceRefError::EmptyRevision)
        ));
    }
}
