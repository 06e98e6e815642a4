//! Application layer
//!
//! Instance selection and the forwarding service built on the upstream port.

pub mod balancer;
pub mod forward_service;

pub use balancer::RoundRobin;
pub use forward_service::{run_keep_alive, ForwardService};
