//! Vault entities
//!
//! Lock state and recovery-code flows for the encrypted vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the vault was locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockReason {
    Idle,
    Backgrounded,
    Logout,
    Force,
    Rotation,
    Admin,
}

impl std::str::FromStr for LockReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(LockReason::Idle),
            "backgrounded" => Ok(LockReason::Backgrounded),
            "logout" => Ok(LockReason::Logout),
            "force" => Ok(LockReason::Force),
            "rotation" => Ok(LockReason::Rotation),
            "admin" => Ok(LockReason::Admin),
            _ => Err(format!("Unknown lock reason: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultLockState {
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lock_reason: Option<String>,
}

impl VaultLockState {
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateRecoveryCodesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRecoveryCodesResponse {
    pub codes: Vec<String>,
    pub vault_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetPassphraseRequest {
    pub code: String,
    pub new_passphrase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPassphraseResponse {
    pub success: bool,
    pub message: String,
    pub vault_id: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePassphraseRequest {
    pub current_passphrase: String,
    pub new_passphrase: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePassphraseResponse {
    pub success: bool,
    pub message: String,
    pub vault_id: String,
}
