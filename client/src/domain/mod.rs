//! Domain layer
//!
//! Contains the data carried between the client and the Ignition backend.
//! - `entities`: DTOs and value types for sessions, focus, settings and the vault
//! - `ports`: Trait definitions for the transport, local storage and push channels

pub mod entities;
pub mod ports;
