//! Composition of the compilation environment.
//!
//! [`EnvironmentConfig`] names aliases; [`EnvironmentConfig::bind`] resolves
//! them against the alternatives registry once, capturing concrete paths.
//! [`EnvironmentComposer::compose`] then turns the bound config into an
//! [`EnvironmentProfile`] without consulting any other state, so the same
//! bound config always yields the same profile.

mod flags;
mod options;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alternatives::{AlternativesRegistry, UnresolvedAliasError};
use crate::core::sanitizer::SanitizerError;
use crate::core::{EnvironmentProfile, Sanitizer, SanitizerSet};

pub use flags::{ExtraFlags, FlagList};
pub use options::{merge_options, render_options};

static VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env var regex"));

/// Error while binding or composing an environment.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedAliasError),

    #[error(transparent)]
    Sanitizer(#[from] SanitizerError),

    #[error("invalid environment variable name `{0}`")]
    InvalidVarName(String),

    #[error("invalid option name `{name}` in {var}")]
    InvalidOptionName { var: String, name: String },

    #[error("value of `{name}` in {var} contains both quote characters: {value}")]
    UnquotableOption {
        var: String,
        name: String,
        value: String,
    },

    #[error("runtime options given for unknown sanitizer `{0}`")]
    UnknownOptionsKey(String),

    #[error("support directory `{0}` is relative but no engine installation is known")]
    SupportDirUnanchored(PathBuf),
}

/// What the compilation environment should look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Alias exported as `CC`.
    pub compiler: String,

    /// Alias exported as `CXX`.
    pub cxx_compiler: String,

    /// Alias exported as `LD`; omitted when unset.
    pub linker: Option<String>,

    /// Sanitizers to instrument with, in order.
    pub sanitizers: SanitizerSet,

    /// Sanitizer checks switched off (`-fno-sanitize=`).
    pub suppress: Vec<Sanitizer>,

    /// Let instrumented programs continue after a report.
    pub recover: bool,

    /// Add `-fsanitize-address-use-after-scope` when address is enabled.
    pub use_after_scope: bool,

    pub frame_pointers: bool,

    pub debug_info: bool,

    /// Runtime options per sanitizer name, e.g. `[environment.runtime_options.address]`.
    pub runtime_options: BTreeMap<String, BTreeMap<String, String>>,

    /// Support-file root of the instrumenting compiler. Relative paths are
    /// taken relative to the engine's install prefix.
    pub support_dir: Option<PathBuf>,

    pub support_dir_var: String,

    /// Turn on the instrumenting compiler's debug output.
    pub debug: bool,

    pub debug_var: String,

    /// Extra flags for both C and C++.
    pub cflags: Vec<String>,

    /// Extra C++-only flags. Leave empty to keep `CXXFLAGS == CFLAGS`.
    pub cxxflags: Vec<String>,

    pub ldflags: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let mut runtime_options = BTreeMap::new();
        runtime_options.insert(
            "address".to_string(),
            string_map(&[
                ("abort_on_error", "1"),
                ("symbolize", "0"),
                ("detect_stack_use_after_return", "1"),
                ("check_initialization_order", "1"),
                ("strict_init_order", "1"),
                ("detect_leaks", "1"),
            ]),
        );
        runtime_options.insert(
            "undefined".to_string(),
            string_map(&[
                ("halt_on_error", "1"),
                ("abort_on_error", "1"),
                ("print_stacktrace", "1"),
            ]),
        );

        EnvironmentConfig {
            compiler: "afl-cc".to_string(),
            cxx_compiler: "afl-c++".to_string(),
            linker: None,
            sanitizers: [Sanitizer::Address, Sanitizer::Undefined]
                .into_iter()
                .collect(),
            suppress: Vec::new(),
            recover: false,
            use_after_scope: true,
            frame_pointers: true,
            debug_info: true,
            runtime_options,
            support_dir: Some(PathBuf::from("lib/afl")),
            support_dir_var: "AFL_PATH".to_string(),
            debug: false,
            debug_var: "AFL_DEBUG".to_string(),
            cflags: Vec::new(),
            cxxflags: Vec::new(),
            ldflags: Vec::new(),
        }
    }
}

fn union(a: &SanitizerSet, b: &SanitizerSet) -> SanitizerSet {
    a.iter().chain(b.iter()).cloned().collect()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl EnvironmentConfig {
    /// Resolve aliases and the support directory into concrete paths.
    pub fn bind(
        &self,
        registry: &AlternativesRegistry,
        install_prefix: Option<&Path>,
    ) -> Result<BoundEnvironment, ComposeError> {
        let compiler = registry.resolve(&self.compiler)?;
        let cxx_compiler = registry.resolve(&self.cxx_compiler)?;
        let linker = self
            .linker
            .as_deref()
            .map(|alias| registry.resolve(alias))
            .transpose()?;

        let support_dir = match &self.support_dir {
            Some(dir) if dir.is_absolute() => Some(dir.clone()),
            Some(dir) => match install_prefix {
                Some(prefix) => Some(prefix.join(dir)),
                None => return Err(ComposeError::SupportDirUnanchored(dir.clone())),
            },
            None => None,
        };

        Ok(BoundEnvironment {
            compiler,
            cxx_compiler,
            linker,
            support_dir,
            config: self.clone(),
        })
    }

    /// Check variable names without resolving anything.
    pub fn validate(&self) -> Result<(), ComposeError> {
        for var in [&self.support_dir_var, &self.debug_var] {
            if !VAR_NAME.is_match(var) {
                return Err(ComposeError::InvalidVarName(var.clone()));
            }
        }
        for key in self.runtime_options.keys() {
            key.parse::<Sanitizer>()
                .map_err(|_| ComposeError::UnknownOptionsKey(key.clone()))?;
        }
        self.sanitizers.check_compatible()?;
        Ok(())
    }
}

/// An [`EnvironmentConfig`] with every alias captured as a concrete path.
///
/// Later changes to the registry do not affect a bound environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundEnvironment {
    pub compiler: PathBuf,
    pub cxx_compiler: PathBuf,
    pub linker: Option<PathBuf>,
    pub support_dir: Option<PathBuf>,
    pub config: EnvironmentConfig,
}

/// Builds [`EnvironmentProfile`]s.
pub struct EnvironmentComposer;

impl EnvironmentComposer {
    pub fn compose(bound: &BoundEnvironment) -> Result<EnvironmentProfile, ComposeError> {
        let cfg = &bound.config;
        cfg.validate()?;

        let c_extra = ExtraFlags::split(&cfg.cflags);
        let cxx_extra = ExtraFlags::split(&cfg.cxxflags);
        let ld_extra = ExtraFlags::split(&cfg.ldflags);

        let sanitizers = union(&cfg.sanitizers, &c_extra.sanitize);
        let configured_suppress: SanitizerSet = cfg.suppress.iter().cloned().collect();
        let suppressed = union(&configured_suppress, &c_extra.no_sanitize);
        let cxx_sanitizers = union(&sanitizers, &cxx_extra.sanitize);
        cxx_sanitizers.check_compatible()?;

        let compile = Self::compile_flags(cfg, &sanitizers, &suppressed, &c_extra.rest);
        let cxx = Self::compile_flags(
            cfg,
            &cxx_sanitizers,
            &union(&suppressed, &cxx_extra.no_sanitize),
            c_extra.rest.iter().chain(&cxx_extra.rest),
        );
        let link_time: SanitizerSet = sanitizers.link_time().cloned().collect();
        let link_sanitizers = union(&link_time, &ld_extra.sanitize);
        link_sanitizers.check_compatible()?;
        let link = Self::link_flags(&link_sanitizers, &ld_extra);

        let mut profile = EnvironmentProfile::new();
        profile.set("CC", bound.compiler.display().to_string());
        profile.set("CXX", bound.cxx_compiler.display().to_string());
        if let Some(linker) = &bound.linker {
            profile.set("LD", linker.display().to_string());
        }
        profile.set("CFLAGS", compile.render());
        profile.set("CXXFLAGS", cxx.render());
        profile.set("LDFLAGS", link.render());

        for (var, value) in Self::runtime_option_vars(cfg, &cxx_sanitizers)? {
            profile.set(var, value);
        }

        if let Some(dir) = &bound.support_dir {
            profile.set(cfg.support_dir_var.as_str(), dir.display().to_string());
        }
        // Presence alone enables debug output in the engine, so "off" means unset.
        if cfg.debug {
            profile.set(cfg.debug_var.as_str(), "1");
        }

        tracing::debug!(vars = profile.len(), digest = %profile.digest(), "composed environment");
        Ok(profile)
    }

    fn compile_flags<'a>(
        cfg: &EnvironmentConfig,
        sanitizers: &SanitizerSet,
        suppressed: &SanitizerSet,
        extra: impl IntoIterator<Item = &'a String>,
    ) -> FlagList {
        let mut flags = FlagList::new();

        if let Some(list) = sanitizers.join() {
            flags.push(format!("-fsanitize={}", list));
        }

        if let Some(list) = suppressed.join() {
            flags.push(format!("-fno-sanitize={}", list));
        }

        if !sanitizers.is_empty() && !cfg.recover {
            flags.push("-fno-sanitize-recover=all");
        }

        if cfg.use_after_scope && sanitizers.contains(&Sanitizer::Address) {
            flags.push("-fsanitize-address-use-after-scope");
        }

        if cfg.frame_pointers {
            flags.push("-fno-omit-frame-pointer");
        }

        if cfg.debug_info {
            flags.push("-g");
        }

        flags.extend(extra.into_iter().cloned());
        flags
    }

    fn link_flags(sanitizers: &SanitizerSet, extra: &ExtraFlags) -> FlagList {
        let mut flags = FlagList::new();
        if let Some(list) = sanitizers.join() {
            flags.push(format!("-fsanitize={}", list));
        }
        if let Some(list) = extra.no_sanitize.join() {
            flags.push(format!("-fno-sanitize={}", list));
        }
        flags.extend(extra.rest.iter().cloned());
        flags
    }

    /// One `*_OPTIONS` variable per runtime, in sanitizer order. Sanitizers
    /// sharing a runtime (undefined, integer) have their options merged.
    fn runtime_option_vars<'a>(
        cfg: &'a EnvironmentConfig,
        sanitizers: &SanitizerSet,
    ) -> Result<Vec<(&'static str, String)>, ComposeError> {
        let mut by_var: Vec<(&'static str, Vec<&'a BTreeMap<String, String>>)> = Vec::new();

        for sanitizer in sanitizers.iter() {
            let Some(var) = sanitizer.options_var() else {
                continue;
            };
            let Some(options) = cfg.runtime_options.get(sanitizer.as_str()) else {
                continue;
            };
            match by_var.iter_mut().find(|(v, _)| *v == var) {
                Some((_, maps)) => maps.push(options),
                None => by_var.push((var, vec![options])),
            }
        }

        by_var
            .into_iter()
            .map(|(var, maps)| {
                let merged = merge_options(maps);
                render_options(var, &merged).map(|rendered| (var, rendered))
            })
            .filter(|r| !matches!(r, Ok((_, s)) if s.is_empty()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AlternativesRegistry {
        let mut reg = AlternativesRegistry::new();
        reg.register("afl-cc", "/opt/afl/bin/afl-clang-fast", 100)
            .unwrap();
        reg.register("afl-c++", "/opt/afl/bin/afl-clang-fast++", 100)
            .unwrap();
        reg
    }

    fn bound(cfg: EnvironmentConfig) -> BoundEnvironment {
        cfg.bind(&registry(), Some(Path::new("/opt/afl"))).unwrap()
    }

    #[test]
    fn test_default_profile() {
        let profile = EnvironmentComposer::compose(&bound(EnvironmentConfig::default())).unwrap();

        assert_eq!(profile.get("CC"), Some("/opt/afl/bin/afl-clang-fast"));
        assert_eq!(profile.get("CXX"), Some("/opt/afl/bin/afl-clang-fast++"));
        assert_eq!(
            profile.get("CFLAGS"),
            Some(
                "-fsanitize=address,undefined -fno-sanitize-recover=all \
                 -fsanitize-address-use-after-scope -fno-omit-frame-pointer -g"
            )
        );
        assert_eq!(profile.get("CFLAGS"), profile.get("CXXFLAGS"));
        assert_eq!(profile.get("LDFLAGS"), Some("-fsanitize=address,undefined"));
        assert_eq!(profile.get("AFL_PATH"), Some("/opt/afl/lib/afl"));
        assert_eq!(profile.get("AFL_DEBUG"), None);
        assert_eq!(profile.get("LD"), None);
        assert!(profile
            .get("ASAN_OPTIONS")
            .unwrap()
            .contains("detect_stack_use_after_return=1"));
        assert!(profile
            .get("UBSAN_OPTIONS")
            .unwrap()
            .contains("halt_on_error=1"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let b = bound(EnvironmentConfig::default());
        let first = EnvironmentComposer::compose(&b).unwrap();
        let second = EnvironmentComposer::compose(&b).unwrap();

        assert_eq!(first.to_shell_script(), second.to_shell_script());
        assert_eq!(first.digest(), second.digest());
    }

    #[test]
    fn test_ldflags_dedup_sanitizers() {
        let mut cfg = EnvironmentConfig::default();
        cfg.sanitizers = [
            Sanitizer::Address,
            Sanitizer::Undefined,
            Sanitizer::Address,
            Sanitizer::Undefined,
        ]
        .into_iter()
        .collect();
        cfg.ldflags = vec!["-fsanitize=address,undefined".to_string()];

        let profile = EnvironmentComposer::compose(&bound(cfg)).unwrap();
        let ldflags = profile.get("LDFLAGS").unwrap();
        assert_eq!(ldflags.matches("address").count(), 1);
        assert_eq!(ldflags.matches("undefined").count(), 1);
        assert!(!ldflags.contains("use-after-scope"));
    }

    #[test]
    fn test_extra_sanitizer_flags_merge_with_configured_set() {
        let mut cfg = EnvironmentConfig::default();
        cfg.ldflags = vec!["-fsanitize=address".to_string(), "-Wl,-z,now".to_string()];
        cfg.cflags = vec!["-fsanitize=undefined,integer".to_string()];

        let profile = EnvironmentComposer::compose(&bound(cfg)).unwrap();
        let ldflags = profile.get("LDFLAGS").unwrap();
        assert_eq!(ldflags, "-fsanitize=address,undefined,integer -Wl,-z,now");

        let cflags = profile.get("CFLAGS").unwrap();
        assert!(cflags.starts_with("-fsanitize=address,undefined,integer "));
        assert_eq!(cflags.matches("undefined").count(), 1);
        assert!(profile.get("UBSAN_OPTIONS").is_some());
    }

    #[test]
    fn test_extra_sanitizer_flags_checked_for_compatibility() {
        let mut cfg = EnvironmentConfig::default();
        cfg.ldflags = vec!["-fsanitize=thread".to_string()];

        let err = EnvironmentComposer::compose(&bound(cfg)).unwrap_err();
        assert!(matches!(err, ComposeError::Sanitizer(_)));
    }

    #[test]
    fn test_cxxflags_diverge_only_on_request() {
        let mut cfg = EnvironmentConfig::default();
        cfg.cxxflags = vec!["-stdlib=libc++".to_string()];

        let profile = EnvironmentComposer::compose(&bound(cfg)).unwrap();
        let cflags = profile.get("CFLAGS").unwrap();
        let cxxflags = profile.get("CXXFLAGS").unwrap();
        assert_eq!(cxxflags, format!("{} -stdlib=libc++", cflags));
    }

    #[test]
    fn test_suppressions_and_recovery() {
        let mut cfg = EnvironmentConfig::default();
        cfg.suppress = vec![
            Sanitizer::Other("function".to_string()),
            Sanitizer::Other("function".to_string()),
        ];
        cfg.recover = true;
        cfg.debug = true;

        let profile = EnvironmentComposer::compose(&bound(cfg)).unwrap();
        let cflags = profile.get("CFLAGS").unwrap();
        assert!(cflags.contains("-fno-sanitize=function"));
        assert!(!cflags.contains("-fno-sanitize-recover"));
        assert_eq!(profile.get("AFL_DEBUG"), Some("1"));
    }

    #[test]
    fn test_incompatible_sanitizers_rejected() {
        let mut cfg = EnvironmentConfig::default();
        cfg.sanitizers = [Sanitizer::Address, Sanitizer::Memory].into_iter().collect();

        let err = EnvironmentComposer::compose(&bound(cfg)).unwrap_err();
        assert!(matches!(err, ComposeError::Sanitizer(_)));
    }

    #[test]
    fn test_bind_snapshots_registry() {
        let mut reg = registry();
        let b = EnvironmentConfig::default()
            .bind(&reg, Some(Path::new("/opt/afl")))
            .unwrap();

        reg.register("afl-cc", "/opt/other/afl-cc", 100).unwrap();
        let profile = EnvironmentComposer::compose(&b).unwrap();
        assert_eq!(profile.get("CC"), Some("/opt/afl/bin/afl-clang-fast"));
    }

    #[test]
    fn test_bind_unresolved_alias() {
        let reg = AlternativesRegistry::new();
        let err = EnvironmentConfig::default()
            .bind(&reg, None)
            .unwrap_err();
        assert!(matches!(err, ComposeError::Unresolved(_)));
    }

    #[test]
    fn test_relative_support_dir_needs_prefix() {
        let err = EnvironmentConfig::default()
            .bind(&registry(), None)
            .unwrap_err();
        assert!(matches!(err, ComposeError::SupportDirUnanchored(_)));
    }

    #[test]
    fn test_invalid_var_name() {
        let mut cfg = EnvironmentConfig::default();
        cfg.support_dir_var = "AFL-PATH".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ComposeError::InvalidVarName(_))
        ));
    }
}
