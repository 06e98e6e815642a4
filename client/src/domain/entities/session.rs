//! Session domain entity
//!
//! The authenticated user as reported by `GET /auth/session`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth providers the backend supports for sign-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Azure,
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthProvider::Google => write!(f, "google"),
            AuthProvider::Azure => write!(f, "azure"),
        }
    }
}

impl std::str::FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(AuthProvider::Google),
            "azure" | "microsoft" => Ok(AuthProvider::Azure),
            _ => Err(format!("Unknown auth provider: {}", s)),
        }
    }
}

/// User record as the backend sends it. Older deployments use camelCase
/// for `tosAccepted`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub role: String,
    #[serde(default)]
    pub entitlements: Option<Vec<String>>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub tos_accepted: Option<bool>,
    #[serde(default, rename = "tosAccepted")]
    pub tos_accepted_camel: Option<bool>,
}

/// Normalized authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: String,
    pub entitlements: Vec<String>,
    pub approved: bool,
    pub tos_accepted: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn has_entitlement(&self, name: &str) -> bool {
        self.entitlements.iter().any(|e| e == name)
    }
}

impl From<RawAuthUser> for AuthUser {
    fn from(raw: RawAuthUser) -> Self {
        Self {
            id: raw.id,
            email: raw.email,
            name: raw.name,
            image: raw.image,
            role: raw.role,
            entitlements: raw.entitlements.unwrap_or_default(),
            approved: raw.approved.unwrap_or(false),
            tos_accepted: raw.tos_accepted.or(raw.tos_accepted_camel).unwrap_or(false),
        }
    }
}

/// Body of `GET /auth/session`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub user: Option<RawAuthUser>,
}

/// Marker written to the store when a session is torn down, so other
/// instances sharing the store notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTermination {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub reason: String,
}

impl SessionTermination {
    pub const STORAGE_KEY: &'static str = "__session_terminated__";

    pub fn expired(at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.timestamp_millis(),
            reason: "session_expired".to_string(),
        }
    }
}
