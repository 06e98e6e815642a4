//! Domain entities

pub mod forward;

pub use forward::{strip_hop_by_hop, ForwardRequest, ForwardResponse};
