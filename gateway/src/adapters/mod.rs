//! Adapters layer
//!
//! Implementations of port traits for external systems.

pub mod http_upstream;

pub use http_upstream::HttpUpstream;
