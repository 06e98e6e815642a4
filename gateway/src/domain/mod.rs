//! Domain layer
//!
//! - `entities`: the request and response shapes passed to upstream instances
//! - `ports`: the upstream trait the forwarder is written against

pub mod entities;
pub mod ports;
