//! Test utilities
//!
//! Manual mock implementations of the ports and payload fixtures. The local
//! store already has an in-memory mode, so it needs no mock.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
