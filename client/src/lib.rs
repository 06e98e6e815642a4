//! Ignition client core
//!
//! Client-side subsystems of the Ignition companion: the API client with
//! retry and offline support, session handling, the focus timer, settings
//! sync, vault encryption and experiment assignment.

pub mod adapters;
pub mod app;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;

#[cfg(test)]
mod test_utils;
