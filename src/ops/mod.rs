//! High-level operations.
//!
//! This module contains the implementation of fuzzenv commands that span
//! more than one component.

pub mod provision;
pub mod state;

pub use provision::{
    provision, ProvisionError, ProvisionObserver, ProvisionOptions, ProvisionReport, Stage,
};
pub use state::{load_state, save_state, SessionState};
