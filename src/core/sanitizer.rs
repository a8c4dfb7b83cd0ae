//! Sanitizer identifiers and ordered sanitizer sets.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static SANITIZER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid sanitizer regex"));

/// Error parsing or combining sanitizers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizerError {
    #[error("invalid sanitizer name `{0}`")]
    InvalidName(String),

    #[error("sanitizers `{0}` and `{1}` cannot be enabled together")]
    Incompatible(Sanitizer, Sanitizer),
}

/// A compiler sanitizer, as passed to `-fsanitize=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Sanitizer {
    Address,
    HwAddress,
    Undefined,
    Thread,
    Memory,
    Leak,
    Integer,
    Nullability,
    ShadowCallStack,
    /// Any other `-fsanitize=` group, passed through verbatim.
    Other(String),
}

impl Sanitizer {
    pub fn as_str(&self) -> &str {
        match self {
            Sanitizer::Address => "address",
            Sanitizer::HwAddress => "hwaddress",
            Sanitizer::Undefined => "undefined",
            Sanitizer::Thread => "thread",
            Sanitizer::Memory => "memory",
            Sanitizer::Leak => "leak",
            Sanitizer::Integer => "integer",
            Sanitizer::Nullability => "nullability",
            Sanitizer::ShadowCallStack => "shadow-call-stack",
            Sanitizer::Other(name) => name,
        }
    }

    /// Whether the sanitizer pulls in a runtime library and therefore has to
    /// be repeated on the link line.
    pub fn requires_link_support(&self) -> bool {
        !matches!(self, Sanitizer::ShadowCallStack)
    }

    /// Environment variable read by this sanitizer's runtime for options.
    pub fn options_var(&self) -> Option<&'static str> {
        match self {
            Sanitizer::Address => Some("ASAN_OPTIONS"),
            Sanitizer::HwAddress => Some("HWASAN_OPTIONS"),
            Sanitizer::Undefined | Sanitizer::Integer | Sanitizer::Nullability => {
                Some("UBSAN_OPTIONS")
            }
            Sanitizer::Thread => Some("TSAN_OPTIONS"),
            Sanitizer::Memory => Some("MSAN_OPTIONS"),
            Sanitizer::Leak => Some("LSAN_OPTIONS"),
            Sanitizer::ShadowCallStack | Sanitizer::Other(_) => None,
        }
    }

    /// Shadow-memory sanitizers that own the address space layout.
    fn is_shadow_exclusive(&self) -> bool {
        matches!(
            self,
            Sanitizer::Address | Sanitizer::HwAddress | Sanitizer::Thread | Sanitizer::Memory
        )
    }
}

impl fmt::Display for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sanitizer {
    type Err = SanitizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "address" => Sanitizer::Address,
            "hwaddress" => Sanitizer::HwAddress,
            "undefined" => Sanitizer::Undefined,
            "thread" => Sanitizer::Thread,
            "memory" => Sanitizer::Memory,
            "leak" => Sanitizer::Leak,
            "integer" => Sanitizer::Integer,
            "nullability" => Sanitizer::Nullability,
            "shadow-call-stack" => Sanitizer::ShadowCallStack,
            _ if SANITIZER_NAME.is_match(&name) => Sanitizer::Other(name),
            _ => return Err(SanitizerError::InvalidName(s.to_string())),
        })
    }
}

impl TryFrom<String> for Sanitizer {
    type Error = SanitizerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sanitizer> for String {
    fn from(value: Sanitizer) -> Self {
        value.as_str().to_string()
    }
}

/// An ordered, duplicate-free set of sanitizers.
///
/// Insertion order is kept so the rendered `-fsanitize=` list is stable; a
/// sanitizer listed twice keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizerSet {
    items: Vec<Sanitizer>,
}

impl SanitizerSet {
    pub fn new() -> Self {
        SanitizerSet::default()
    }

    /// Add a sanitizer. Returns `false` if it was already present.
    pub fn insert(&mut self, sanitizer: Sanitizer) -> bool {
        if self.items.contains(&sanitizer) {
            return false;
        }
        self.items.push(sanitizer);
        true
    }

    pub fn contains(&self, sanitizer: &Sanitizer) -> bool {
        self.items.contains(sanitizer)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sanitizer> {
        self.items.iter()
    }

    /// Sanitizers that must also appear on the link line.
    pub fn link_time(&self) -> impl Iterator<Item = &Sanitizer> {
        self.items.iter().filter(|s| s.requires_link_support())
    }

    /// Reject combinations the compiler refuses to instrument together.
    pub fn check_compatible(&self) -> Result<(), SanitizerError> {
        let exclusive: Vec<&Sanitizer> =
            self.items.iter().filter(|s| s.is_shadow_exclusive()).collect();
        if let [first, second, ..] = exclusive.as_slice() {
            return Err(SanitizerError::Incompatible(
                (*first).clone(),
                (*second).clone(),
            ));
        }
        Ok(())
    }

    /// Comma-joined list, or `None` when empty.
    pub fn join(&self) -> Option<String> {
        join_names(self.items.iter())
    }

    pub fn join_link_time(&self) -> Option<String> {
        join_names(self.link_time())
    }
}

fn join_names<'a>(items: impl Iterator<Item = &'a Sanitizer>) -> Option<String> {
    let names: Vec<&str> = items.map(Sanitizer::as_str).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(","))
    }
}

impl FromIterator<Sanitizer> for SanitizerSet {
    fn from_iter<I: IntoIterator<Item = Sanitizer>>(iter: I) -> Self {
        let mut set = SanitizerSet::new();
        for sanitizer in iter {
            set.insert(sanitizer);
        }
        set
    }
}

impl<'de> Deserialize<'de> for SanitizerSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = Vec::<Sanitizer>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
