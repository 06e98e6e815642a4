//! HTTP adapter
//!
//! reqwest-backed transport for the Ignition API.

pub mod transport;

pub use transport::ReqwestTransport;
