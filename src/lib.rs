//! fuzzenv - provision a sanitizer-instrumented fuzzing toolchain
//!
//! This crate provides the library behind the `fuzzenv` binary: an
//! alternatives registry for compiler aliases, a builder for the fuzzing
//! engine, a composer for the compilation environment, and a fail-fast lint
//! gate.

pub mod alternatives;
pub mod builder;
pub mod core;
pub mod env;
pub mod lint;
pub mod ops;
pub mod sources;
pub mod util;

/// Test fixtures for fuzzenv unit tests.
///
/// Provides throwaway git origins and a config wired to them, so builder
/// and pipeline tests run without network access or a real compiler.
#[cfg(test)]
pub mod test_support;

pub use alternatives::{AlternativesRegistry, UnresolvedAliasError};
pub use builder::{Installation, ToolchainBuilder};
pub use core::{EnvironmentProfile, Sanitizer, SourceRef};
pub use env::{EnvironmentComposer, EnvironmentConfig};
pub use lint::{LintGate, LintOutcome};
pub use util::Config;
