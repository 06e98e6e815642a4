//! Storage adapter
//!
//! In-memory and directory-backed key-value store.

pub mod local_store;

pub use local_store::{LocalStore, EXTERNAL_ORIGIN};
