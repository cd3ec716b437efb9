// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Shared application state handed to every axum handler (S6).

use std::sync::Arc;

use tracing::info;

use crate::application::lifecycle_service::LifecycleService;
use crate::application::mediator_service::MediatorService;
use crate::application::inventory_service::InventoryService;
use crate::application::policy_service::PolicyService;
use crate::domain::repository::{
    AnonymousSessionRepository, AuthorizationCodeRepository, OAuthClientRepository,
    OAuthSigningKeyRepository, RepositoryError, TaskEventRepository, TaskRepository,
};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::jwt::{self, JwtError, SigningKeyCache};

/// Process-wide configuration assembled from S6.5's env vars; the binary
/// crate is responsible for reading the environment and constructing this.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `getIssuer()`: this deployment's own origin, used as `iss` and as
    /// the base for every self-issued OAuth endpoint (S4.I).
    pub issuer: String,
    /// `MCP_ENABLE_ANONYMOUS_OAUTH`.
    pub anonymous_oauth_enabled: bool,
    /// `MCP_AUTHORIZATION_SERVER`: upstream issuer for non-anonymous
    /// sessions, proxied rather than self-issued.
    pub upstream_authorization_server: Option<String>,
    /// `EXECUTOR_INTERNAL_TOKEN`: shared secret the runtime callback
    /// surface (S6.3) requires on every request.
    pub internal_token: String,
    pub enabled_runtimes: Vec<String>,
}

impl AppConfig {
    /// The JWT audience minted into anonymous access tokens: `<issuer>/mcp`
    /// (S4.I.5).
    pub fn mcp_audience(&self) -> String {
        format!("{}/mcp", self.issuer.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    pub task_repo: Arc<dyn TaskRepository>,
    pub event_repo: Arc<dyn TaskEventRepository>,
    pub event_bus: EventBus,

    pub lifecycle: Arc<LifecycleService>,
    pub mediator: Arc<MediatorService>,
    pub inventory: Arc<InventoryService>,
    pub policy: Arc<PolicyService>,

    pub anon_sessions: Arc<dyn AnonymousSessionRepository>,
    pub oauth_clients: Arc<dyn OAuthClientRepository>,
    pub auth_codes: Arc<dyn AuthorizationCodeRepository>,
    pub signing_keys: Arc<dyn OAuthSigningKeyRepository>,
    pub signing_key_cache: SigningKeyCache,
}

impl AppState {
    /// S4.I "Key management": load the active signing key from the Store,
    /// or mint and persist a fresh one if none exists, then warm the
    /// in-process cache. Called once at process start.
    pub async fn bootstrap_signing_key(&self) -> Result<(), SigningKeyBootstrapError> {
        if let Some(existing) = self.signing_keys.load_active().await? {
            self.signing_key_cache.init(&existing)?;
            info!(key_id = %existing.key_id, "loaded active OAuth signing key from store");
            return Ok(());
        }

        let fresh = jwt::generate_signing_key()?;
        self.signing_keys.store_active(&fresh).await?;
        self.signing_key_cache.init(&fresh)?;
        info!(key_id = %fresh.key_id, "generated fresh OAuth signing key");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SigningKeyBootstrapError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}
