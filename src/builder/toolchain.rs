//! The system toolchain the engine is compiled with.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::alternatives::{AlternativesRegistry, UnresolvedAliasError};

/// Which aliases build the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildToolchain {
    pub cc: String,
    pub cxx: String,
}

impl Default for BuildToolchain {
    fn default() -> Self {
        BuildToolchain {
            cc: "cc".to_string(),
            cxx: "c++".to_string(),
        }
    }
}

impl BuildToolchain {
    /// Capture the current bindings of both aliases.
    pub fn resolve(
        &self,
        registry: &AlternativesRegistry,
    ) -> Result<ResolvedToolchain, UnresolvedAliasError> {
        Ok(ResolvedToolchain {
            cc: registry.resolve(&self.cc)?,
            cxx: registry.resolve(&self.cxx)?,
        })
    }
}

/// Concrete compiler paths, fixed for the duration of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

impl ResolvedToolchain {
    pub fn env(&self) -> [(&'static str, String); 2] {
        [
            ("CC", self.cc.display().to_string()),
            ("CXX", self.cxx.display().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_build_toolchain() {
        let mut reg = AlternativesRegistry::new();
        reg.register("cc", "/usr/bin/clang-19", 100).unwrap();

        let tc = BuildToolchain::default();
        assert_eq!(
            tc.resolve(&reg).unwrap_err(),
            UnresolvedAliasError {
                alias: "c++".to_string()
            }
        );

        reg.register("c++", "/usr/bin/clang++-19", 100).unwrap();
        let resolved = tc.resolve(&reg).unwrap();
        assert_eq!(resolved.cc, PathBuf::from("/usr/bin/clang-19"));
        assert_eq!(resolved.env()[1], ("CXX", "/usr/bin/clang++-19".to_string()));
    }
}
