//! Domain entities
//!
//! Wire types exchanged with the backend plus the client-local snapshots
//! persisted in the key-value store.

pub mod focus;
pub mod session;
pub mod settings;
pub mod vault;

pub use focus::{
    ActiveFocusResponse, CompleteSessionResult, CreateFocusRequest, FocusMode, FocusSession,
    FocusSessionsList, FocusStats, FocusStatus, PauseState, PausedSnapshot, StatsPeriod,
};
pub use session::{AuthProvider, AuthUser, RawAuthUser, SessionResponse, SessionTermination};
pub use settings::{
    Accessibility, ServerSettings, SettingEntry, SettingsMap, SettingsResponse, Theme,
    UpdateSettingRequest,
};
pub use vault::{
    ChangePassphraseRequest, ChangePassphraseResponse, GenerateRecoveryCodesRequest,
    GenerateRecoveryCodesResponse, LockReason, ResetPassphraseRequest, ResetPassphraseResponse,
    VaultLockState,
};
