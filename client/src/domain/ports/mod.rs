//! Domain ports (traits)
//!
//! Interfaces the application layer needs from the outside world.
//! Adapters provide the concrete implementations.

pub mod settings_feed;
pub mod storage;
pub mod transport;

pub use settings_feed::{SettingsEvent, SettingsFeed};
pub use storage::{KeyValueStore, StorageEvent, StorageSubscription};
pub use transport::{ApiRequest, ApiResponse, ApiTransport, Method};
