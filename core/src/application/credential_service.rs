// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Credential resolution orchestration (§4.C): binding lookup, secret
//! backend dispatch, and header construction.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::credential::{build_headers, CredentialScope, CredentialSpec, SecretPayload};
use crate::domain::repository::{CredentialRepository, RepositoryError};
use crate::domain::workspace::WorkspaceId;
use crate::infrastructure::credential_backend::{SecretBackend, SecretBackendError};

#[derive(Debug, Error)]
pub enum CredentialResolutionError {
    #[error("Missing credential for source '{0}' ({1:?} scope)")]
    Missing(String, CredentialScope),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Backend(#[from] SecretBackendError),
}

/// Resolves the backend keyed by `EXECUTOR_SECRET_BACKEND` (§6.5).
pub struct CredentialService {
    credential_repo: Arc<dyn CredentialRepository>,
    local_backend: Arc<dyn SecretBackend>,
    vault_backend: Option<Arc<dyn SecretBackend>>,
}

impl CredentialService {
    pub fn new(
        credential_repo: Arc<dyn CredentialRepository>,
        local_backend: Arc<dyn SecretBackend>,
        vault_backend: Option<Arc<dyn SecretBackend>>,
    ) -> Self {
        Self { credential_repo, local_backend, vault_backend }
    }

    /// Runs §4.C steps 1-4 and returns the headers a tool `run` call should
    /// carry, or a `Missing` error including the spec's `sourceKey`/`scope`.
    pub async fn resolve_headers(
        &self,
        spec: &CredentialSpec,
        workspace_id: WorkspaceId,
        actor_id: Option<&str>,
    ) -> Result<HashMap<String, String>, CredentialResolutionError> {
        let binding = self
            .credential_repo
            .find_binding(workspace_id, &spec.source_key, spec.scope, actor_id)
            .await?;

        let (payload, backend, overrides) = match binding {
            Some(b) => (b.payload, b.backend, b.header_overrides),
            None => match &spec.static_secret_json {
                Some(value) => (
                    SecretPayload::Inline { value: value.clone() },
                    crate::domain::credential::SecretBackend::LocalConvex,
                    HashMap::new(),
                ),
                None => {
                    return Err(CredentialResolutionError::Missing(spec.source_key.clone(), spec.scope))
                }
            },
        };

        let resolver: &Arc<dyn SecretBackend> = match backend {
            crate::domain::credential::SecretBackend::LocalConvex => &self.local_backend,
            crate::domain::credential::SecretBackend::WorkosVault => self
                .vault_backend
                .as_ref()
                .unwrap_or(&self.local_backend),
        };

        let secret_value = resolver.resolve(&payload).await?;
        let headers = build_headers(spec.auth_type, spec.header_name.as_deref(), &secret_value, &overrides);

        if headers.is_empty() {
            return Err(CredentialResolutionError::Missing(spec.source_key.clone(), spec.scope));
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::AuthType;
    use crate::infrastructure::credential_backend::LocalSecretBackend;
    use crate::infrastructure::repositories::InMemoryCredentialRepository;

    fn spec() -> CredentialSpec {
        CredentialSpec {
            source_key: "github".to_string(),
            scope: CredentialScope::Workspace,
            auth_type: AuthType::Bearer,
            header_name: None,
            static_secret_json: None,
        }
    }

    #[tokio::test]
    async fn missing_binding_and_no_static_secret_errors() {
        let service = CredentialService::new(
            Arc::new(InMemoryCredentialRepository::new()),
            Arc::new(LocalSecretBackend),
            None,
        );
        let err = service.resolve_headers(&spec(), WorkspaceId::new(), None).await.unwrap_err();
        assert!(matches!(err, CredentialResolutionError::Missing(_, _)));
    }

    #[tokio::test]
    async fn static_secret_fallback_resolves_headers() {
        let mut s = spec();
        s.static_secret_json = Some(serde_json::json!("tok-1"));
        let service = CredentialService::new(
            Arc::new(InMemoryCredentialRepository::new()),
            Arc::new(LocalSecretBackend),
            None,
        );
        let headers = service.resolve_headers(&s, WorkspaceId::new(), None).await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer tok-1");
    }
}
