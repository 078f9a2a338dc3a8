//! Shared fixtures for the unit tests: an in-memory fleet and a target that records
//! every callback it receives.
mod common;
mod fleet;
mod recording_target;

pub use common::*;
pub use fleet::*;
pub use recording_target::*;
