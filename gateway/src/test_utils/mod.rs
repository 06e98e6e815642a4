//! Test utilities
//!
//! A scripted upstream pool and a test server wired to it.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
