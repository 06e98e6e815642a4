//! WebSocket adapter
//!
//! Settings push channel over tokio-tungstenite.

pub mod settings_socket;

pub use settings_socket::WebSocketSettingsFeed;
