// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Secret backend adapters for the Credential Resolver (§4.C step 2).
//!
//! `EXECUTOR_SECRET_BACKEND` selects which adapter resolves a stored
//! `SecretPayload` into the concrete JSON value `build_headers` consumes.
//! `local-convex` is a pass-through (the stored payload already is the
//! secret); `workos-vault` fetches an external vault, retrying only on the
//! vault's transient "not yet ready" signal (§7 Retries).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::credential::SecretPayload;

const VAULT_RETRY_INITIAL_MS: u64 = 500;
const VAULT_RETRY_MAX_MS: u64 = 10_000;
const VAULT_RETRY_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum SecretBackendError {
    #[error("vault object not found: {0}")]
    NotFound(String),
    #[error("vault request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn resolve(&self, payload: &SecretPayload) -> Result<Value, SecretBackendError>;
}

/// `local-convex`: the stored payload already carries the plaintext secret
/// (mirrors the Store-backed default this system runs with when no
/// external vault is configured).
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSecretBackend;

#[async_trait]
impl SecretBackend for LocalSecretBackend {
    async fn resolve(&self, payload: &SecretPayload) -> Result<Value, SecretBackendError> {
        match payload {
            SecretPayload::Inline { value } => Ok(value.clone()),
            SecretPayload::VaultRef { object_id } => Err(SecretBackendError::NotFound(format!(
                "local-convex backend cannot resolve vault ref {object_id}"
            ))),
        }
    }
}

/// `workos-vault`: fetches the secret by its opaque object id. Retries
/// with exponential backoff only while the vault reports the object isn't
/// ready yet (§7 Retries: 500ms -> 10s, up to 10 attempts).
pub struct VaultSecretBackend {
    client: vaultrs::client::VaultClient,
    mount: String,
}

impl VaultSecretBackend {
    pub fn new(client: vaultrs::client::VaultClient, mount: impl Into<String>) -> Self {
        Self { client, mount: mount.into() }
    }

    async fn fetch_once(&self, object_id: &str) -> Result<Value, SecretBackendError> {
        let secret: std::collections::HashMap<String, String> =
            vaultrs::kv2::read(&self.client, &self.mount, object_id)
                .await
                .map_err(|e| SecretBackendError::Transport(e.to_string()))?;
        Ok(serde_json::to_value(secret).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SecretBackend for VaultSecretBackend {
    async fn resolve(&self, payload: &SecretPayload) -> Result<Value, SecretBackendError> {
        let object_id = match payload {
            SecretPayload::VaultRef { object_id } => object_id.clone(),
            SecretPayload::Inline { value } => return Ok(value.clone()),
        };

        let mut delay_ms = VAULT_RETRY_INITIAL_MS;
        let mut last_err = None;
        for attempt in 0..VAULT_RETRY_MAX_ATTEMPTS {
            match self.fetch_once(&object_id).await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient_not_ready(&e) && attempt + 1 < VAULT_RETRY_MAX_ATTEMPTS => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(VAULT_RETRY_MAX_MS);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| SecretBackendError::NotFound(object_id)))
    }
}

fn is_transient_not_ready(err: &SecretBackendError) -> bool {
    matches!(err, SecretBackendError::Transport(msg) if msg.contains("not yet ready") || msg.contains("503"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_passes_through_inline_value() {
        let backend = LocalSecretBackend;
        let value = backend
            .resolve(&SecretPayload::Inline { value: serde_json::json!("tok-123") })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("tok-123"));
    }

    #[tokio::test]
    async fn local_backend_rejects_vault_ref() {
        let backend = LocalSecretBackend;
        let err = backend
            .resolve(&SecretPayload::VaultRef { object_id: "obj-1".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, SecretBackendError::NotFound(_)));
    }
}
