//! Core data model: pinned sources, sanitizers, and environment profiles.

pub mod profile;
pub mod sanitizer;
pub mod source_ref;

pub use profile::EnvironmentProfile;
pub use sanitizer::{Sanitizer, SanitizerSet};
pub use source_ref::SourceRef;
