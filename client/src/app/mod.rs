//! Application layer
//!
//! Services and state machines built on the domain ports: the API client
//! and its endpoint wrappers, retry, offline cache and queue, focus
//! tracking, settings sync and experiments.

pub mod api_client;
pub mod auth_service;
pub mod experiments;
pub mod focus_api;
pub mod focus_service;
pub mod focus_tracker;
pub mod offline_cache;
pub mod offline_queue;
pub mod retry;
pub mod settings_api;
pub mod settings_service;
pub mod vault_api;

pub use api_client::{ApiClient, MutationOutcome, SessionExpiryHandler};
pub use auth_service::AuthService;
pub use experiments::{Experiment, ExperimentTracker, ExperimentVariant, Outcome};
pub use focus_api::FocusApi;
pub use focus_service::FocusService;
pub use focus_tracker::{FocusState, FocusTracker, FocusView, Tick};
pub use offline_cache::{
    CacheConfig, CacheHandle, CacheHit, CacheStats, CacheVersionGuard, CacheWorker,
    CachingTransport,
    VersionCheck,
};
pub use offline_queue::{FlushReport, OfflineQueue, QueuedMutation};
pub use retry::{RetryPolicy, Retryable};
pub use settings_api::SettingsApi;
pub use settings_service::{SettingsSnapshot, SettingsSync, SyncMode};
pub use vault_api::VaultApi;
