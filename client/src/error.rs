//! Error types for the Ignition client
//!
//! One error type per layer:
//! - `ApiError`: HTTP transport and API response errors
//! - `StorageError`: local key-value store errors
//! - `CryptoError`: vault encryption errors
//! - `SyncError`: settings push channel errors
//! - `ClientError`: umbrella used by the CLI and long-running services

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Error type reported by the backend in its JSON error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    Internal,
    ServiceUnavailable,
    Other(String),
}

impl ErrorKind {
    /// Classify from the backend `type` field, falling back to the status code.
    pub fn classify(kind: Option<&str>, status: u16) -> Self {
        match kind {
            Some("unauthorized") => return ErrorKind::Unauthorized,
            Some("forbidden") => return ErrorKind::Forbidden,
            Some("not_found") => return ErrorKind::NotFound,
            Some("validation_error") => return ErrorKind::Validation,
            Some("conflict") => return ErrorKind::Conflict,
            Some("rate_limited") => return ErrorKind::RateLimited,
            _ => {}
        }

        match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            503 => ErrorKind::ServiceUnavailable,
            s if s >= 500 => ErrorKind::Internal,
            _ => ErrorKind::Other(kind.unwrap_or("api_error").to_string()),
        }
    }
}

/// HTTP layer errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("API error: {status} - {message}")]
    Http {
        status: u16,
        kind: ErrorKind,
        message: String,
        details: Option<Value>,
    },

    #[error("Session expired")]
    SessionExpired,

    #[error("Offline write blocked for encrypted content: {0}")]
    OfflineBlocked(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Local storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Status code carried by the error; 0 for transport failures.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::SessionExpired => 401,
            ApiError::Timeout => 408,
            ApiError::OfflineBlocked(_) => 409,
            ApiError::InvalidRequest(_) => 400,
            ApiError::Network(_) | ApiError::Deserialization(_) | ApiError::Storage(_) => 0,
        }
    }

    /// Transient failures worth another attempt: network errors, timeouts,
    /// 5xx responses and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// True when the request never reached the server.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }

    pub fn is_auth_error(&self) -> bool {
        match self {
            ApiError::SessionExpired => true,
            ApiError::Http { kind, status, .. } => {
                *kind == ErrorKind::Unauthorized || *status == 401
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Http { kind: ErrorKind::NotFound, .. })
            || self.status() == 404
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Http { kind: ErrorKind::Forbidden, .. })
            || self.status() == 403
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ApiError::Http {
                kind: ErrorKind::Validation,
                ..
            } | ApiError::InvalidRequest(_)
        )
    }

    /// Stable error code used for user-facing messages.
    pub fn code(&self) -> String {
        match self {
            ApiError::Network(_) => "NETWORK_ERROR".to_string(),
            ApiError::Timeout => "TIMEOUT".to_string(),
            ApiError::SessionExpired => "UNAUTHORIZED".to_string(),
            ApiError::OfflineBlocked(_) => "OFFLINE_BLOCKED".to_string(),
            ApiError::Deserialization(_) => "PARSE_ERROR".to_string(),
            ApiError::InvalidRequest(_) => "VALIDATION_ERROR".to_string(),
            ApiError::Storage(_) => "STORAGE_ERROR".to_string(),
            ApiError::Http { kind, status, .. } => match kind {
                ErrorKind::Unauthorized => "UNAUTHORIZED".to_string(),
                ErrorKind::Forbidden => "FORBIDDEN".to_string(),
                ErrorKind::NotFound => "NOT_FOUND".to_string(),
                ErrorKind::Validation => "VALIDATION_ERROR".to_string(),
                ErrorKind::Conflict => "CONFLICT".to_string(),
                ErrorKind::RateLimited => "RATE_LIMITED".to_string(),
                ErrorKind::Internal => "INTERNAL_ERROR".to_string(),
                ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE".to_string(),
                ErrorKind::Other(_) => format!("HTTP_{}", status),
            },
        }
    }

    /// Message suitable for a toast or banner.
    pub fn user_message(&self) -> String {
        let friendly = match self.code().as_str() {
            "VALIDATION_ERROR" => Some("Please check your input and try again"),
            "UNAUTHORIZED" => Some("Please log in to continue"),
            "FORBIDDEN" => Some("You do not have permission to perform this action"),
            "NOT_FOUND" => Some("The requested resource was not found"),
            "CONFLICT" => Some("This action conflicts with existing data"),
            "RATE_LIMITED" => Some("Too many requests. Please try again later"),
            "INTERNAL_ERROR" => Some("An unexpected error occurred. Please try again"),
            "SERVICE_UNAVAILABLE" => Some("The service is temporarily unavailable"),
            "NETWORK_ERROR" | "TIMEOUT" => {
                Some("Network connection error. Please check your internet")
            }
            _ => None,
        };

        match (friendly, self) {
            (Some(msg), _) => msg.to_string(),
            (None, ApiError::Http { message, .. }) => message.clone(),
            (None, _) => "An unexpected error occurred".to_string(),
        }
    }

    /// Field-level validation messages from the error details, if any.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        #[derive(Deserialize)]
        struct FieldError {
            field: String,
            message: String,
        }

        let ApiError::Http {
            details: Some(details),
            ..
        } = self
        else {
            return Vec::new();
        };

        serde_json::from_value::<Vec<FieldError>>(details.clone())
            .map(|errs| errs.into_iter().map(|e| (e.field, e.message)).collect())
            .unwrap_or_default()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

/// Local key-value store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Vault encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed: wrong passphrase or tampered data")]
    Decrypt,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(String),
}

/// Settings push channel errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Channel closed")]
    Closed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Umbrella error for services that touch several layers
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::Http {
            status,
            kind: ErrorKind::classify(None, status),
            message: format!("status {}", status),
            details: None,
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(ApiError::Network("connection reset".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        assert!(http(500).is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!ApiError::SessionExpired.is_retryable());
    }

    #[test]
    fn kind_prefers_backend_type() {
        assert_eq!(
            ErrorKind::classify(Some("not_found"), 400),
            ErrorKind::NotFound
        );
        assert_eq!(ErrorKind::classify(None, 429), ErrorKind::RateLimited);
        assert_eq!(
            ErrorKind::classify(Some("teapot"), 418),
            ErrorKind::Other("teapot".to_string())
        );
    }

    #[test]
    fn codes_and_user_messages() {
        assert_eq!(http(429).code(), "RATE_LIMITED");
        assert_eq!(
            http(429).user_message(),
            "Too many requests. Please try again later"
        );
        assert_eq!(http(418).code(), "HTTP_418");
        assert_eq!(http(418).user_message(), "status 418");
        assert_eq!(
            ApiError::Network("dns".into()).user_message(),
            "Network connection error. Please check your internet"
        );
    }

    #[test]
    fn status_helpers() {
        assert!(ApiError::SessionExpired.is_auth_error());
        assert!(http(404).is_not_found());
        assert!(http(403).is_forbidden());
        assert!(http(422).is_validation());
        assert_eq!(ApiError::Timeout.status(), 408);
    }

    #[test]
    fn field_errors_from_details() {
        let err = ApiError::Http {
            status: 422,
            kind: ErrorKind::Validation,
            message: "invalid".into(),
            details: Some(serde_json::json!([
                {"field": "title", "message": "required"}
            ])),
        };
        assert_eq!(
            err.field_errors(),
            vec![("title".to_string(), "required".to_string())]
        );
        assert!(http(500).field_errors().is_empty());
    }
}
