//! Source acquisition for the fuzzing engine.

pub mod git;

pub use git::{GitError, GitWorktree};
