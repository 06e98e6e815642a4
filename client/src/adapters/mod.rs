//! Adapters layer
//!
//! Implementations of port traits for external systems.

pub mod http;
pub mod storage;
pub mod ws;

pub use http::ReqwestTransport;
pub use storage::LocalStore;
pub use ws::WebSocketSettingsFeed;
