//! Vault lock and recovery endpoints

use std::sync::Arc;

use serde_json::json;

use crate::app::api_client::ApiClient;
use crate::domain::entities::{
    ChangePassphraseRequest, ChangePassphraseResponse, GenerateRecoveryCodesRequest,
    GenerateRecoveryCodesResponse, LockReason, ResetPassphraseRequest, ResetPassphraseResponse,
    VaultLockState,
};
use crate::domain::ports::ApiTransport;
use crate::error::ApiError;

pub struct VaultApi<T> {
    client: Arc<ApiClient<T>>,
}

impl<T> Clone for VaultApi<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<T: ApiTransport> VaultApi<T> {
    pub fn new(client: Arc<ApiClient<T>>) -> Self {
        Self { client }
    }

    pub async fn lock(&self, reason: LockReason) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .client
            .post("/api/vault/lock", &json!({ "reason": reason }))
            .await?;
        Ok(())
    }

    pub async fn unlock(&self, passphrase: &str) -> Result<VaultLockState, ApiError> {
        if passphrase.is_empty() {
            return Err(ApiError::InvalidRequest("Passphrase is required".into()));
        }
        self.client
            .post("/api/vault/unlock", &json!({ "passphrase": passphrase }))
            .await
    }

    pub async fn state(&self) -> Result<VaultLockState, ApiError> {
        self.client.get("/api/vault/state").await
    }

    /// A vault whose state cannot be read is treated as locked.
    pub async fn is_locked(&self) -> bool {
        match self.state().await {
            Ok(state) => state.is_locked(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check vault lock state");
                true
            }
        }
    }

    pub async fn generate_recovery_codes(
        &self,
        request: &GenerateRecoveryCodesRequest,
    ) -> Result<GenerateRecoveryCodesResponse, ApiError> {
        self.client.post("/api/vault/recovery-codes", request).await
    }

    pub async fn reset_passphrase(
        &self,
        request: &ResetPassphraseRequest,
    ) -> Result<ResetPassphraseResponse, ApiError> {
        self.client.post("/api/vault/reset-passphrase", request).await
    }

    pub async fn change_passphrase(
        &self,
        request: &ChangePassphraseRequest,
    ) -> Result<ChangePassphraseResponse, ApiError> {
        self.client.post("/api/vault/change-passphrase", request).await
    }
}
