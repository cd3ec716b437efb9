// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

// Repository Pattern - Storage Backend Abstraction
//
// Defines pluggable storage backend for repositories, enabling:
// - In-memory storage for development/testing
// - PostgreSQL for production persistence
// - Future storage backends (SQLite, etc.)
//
// One repository per aggregate root, following the rest of this codebase.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::approval::{Approval, ApprovalId};
use crate::domain::credential::{CredentialScope, SourceCredential};
use crate::domain::inventory::InventoryBuildState;
use crate::domain::oauth::{AuthorizationCode, OAuthClient, OAuthClientId, OAuthSigningKey};
use crate::domain::policy::AccessPolicy;
use crate::domain::task::{Task, TaskId, TaskStatus};
use crate::domain::task_event::TaskEvent;
use crate::domain::tool_call::ToolCall;
use crate::domain::tool_source::{ToolSource, ToolSourceId};
use crate::domain::workspace::{AnonymousSession, WorkspaceId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
    // Future: SQLite(SqliteConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for Task aggregates.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;

    /// Queue scan by `(status, createdAt)`.
    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, RepositoryError>;

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, RepositoryError>;
}

/// Append-only log of `TaskEvent`s, one stream per task (§6.4).
#[async_trait]
pub trait TaskEventRepository: Send + Sync {
    async fn append(&self, event: &TaskEvent) -> Result<(), RepositoryError>;

    /// In `(taskId, sequence)` order.
    async fn find_by_task(&self, task_id: &TaskId) -> Result<Vec<TaskEvent>, RepositoryError>;
}

/// Repository interface for Approval aggregates.
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn save(&self, approval: &Approval) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError>;

    async fn find_pending_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Approval>, RepositoryError>;
}

/// Repository interface for ToolCall aggregates: the idempotency row keyed
/// on `(taskId, callId)` (§4.G step 1).
#[async_trait]
pub trait ToolCallRepository: Send + Sync {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError>;

    async fn find(&self, task_id: &TaskId, call_id: &str) -> Result<Option<ToolCall>, RepositoryError>;
}

/// Repository interface for ToolSource aggregates.
#[async_trait]
pub trait ToolSourceRepository: Send + Sync {
    async fn save(&self, source: &ToolSource) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ToolSourceId) -> Result<Option<ToolSource>, RepositoryError>;

    async fn find_by_name(&self, workspace_id: WorkspaceId, name: &str) -> Result<Option<ToolSource>, RepositoryError>;

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<ToolSource>, RepositoryError>;

    async fn delete(&self, id: ToolSourceId) -> Result<(), RepositoryError>;
}

/// Repository interface for AccessPolicy rows.
#[async_trait]
pub trait AccessPolicyRepository: Send + Sync {
    async fn save(&self, policy: &AccessPolicy) -> Result<(), RepositoryError>;

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<AccessPolicy>, RepositoryError>;
}

/// Repository interface for SourceCredential aggregates.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn save(&self, credential: &SourceCredential) -> Result<(), RepositoryError>;

    /// By `(workspaceId, sourceKey, scope[, actorId])` per §4.C step 2.
    async fn find_binding(
        &self,
        workspace_id: WorkspaceId,
        source_key: &str,
        scope: CredentialScope,
        actor_id: Option<&str>,
    ) -> Result<Option<SourceCredential>, RepositoryError>;
}

/// Repository interface for workspace-scoped anonymous sessions.
#[async_trait]
pub trait AnonymousSessionRepository: Send + Sync {
    async fn save(&self, session: &AnonymousSession) -> Result<(), RepositoryError>;

    async fn find(&self, session_id: &str) -> Result<Option<AnonymousSession>, RepositoryError>;
}

/// Repository interface for dynamically registered OAuth clients.
#[async_trait]
pub trait OAuthClientRepository: Send + Sync {
    async fn save(&self, client: &OAuthClient) -> Result<(), RepositoryError>;

    async fn find(&self, client_id: &OAuthClientId) -> Result<Option<OAuthClient>, RepositoryError>;
}

/// Repository interface for single-use authorization codes.
#[async_trait]
pub trait AuthorizationCodeRepository: Send + Sync {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), RepositoryError>;

    /// Atomic read-and-delete: a second caller racing the same code sees
    /// `None`, enforcing single use (§4.I.5).
    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, RepositoryError>;

    async fn count_pending(&self) -> Result<usize, RepositoryError>;

    /// Drops expired codes, returning the number removed (§4.I housekeeping).
    async fn purge_expired(&self) -> Result<usize, RepositoryError>;
}

/// Repository interface for the deployment's RS256 signing key (§4.I.6).
#[async_trait]
pub trait OAuthSigningKeyRepository: Send + Sync {
    async fn load_active(&self) -> Result<Option<OAuthSigningKey>, RepositoryError>;

    async fn store_active(&self, key: &OAuthSigningKey) -> Result<(), RepositoryError>;
}

/// Repository interface for the per-workspace inventory build-state row
/// (§4.E single-flight coordination).
#[async_trait]
pub trait InventoryStateRepository: Send + Sync {
    async fn load(&self, workspace_id: WorkspaceId) -> Result<InventoryBuildState, RepositoryError>;

    async fn save(&self, workspace_id: WorkspaceId, state: &InventoryBuildState) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

use crate::infrastructure::repositories::{
    InMemoryAccessPolicyRepository, InMemoryAnonymousSessionRepository, InMemoryApprovalRepository,
    InMemoryAuthorizationCodeRepository, InMemoryCredentialRepository, InMemoryInventoryStateRepository,
    InMemoryOAuthClientRepository, InMemoryOAuthSigningKeyRepository, InMemoryTaskEventRepository,
    InMemoryTaskRepository, InMemoryToolCallRepository, InMemoryToolSourceRepository,
};
use crate::infrastructure::repositories::postgres::{
    PostgresAccessPolicyRepository, PostgresAnonymousSessionRepository, PostgresApprovalRepository,
    PostgresAuthorizationCodeRepository, PostgresCredentialRepository, PostgresInventoryStateRepository,
    PostgresOAuthClientRepository, PostgresOAuthSigningKeyRepository, PostgresTaskEventRepository,
    PostgresTaskRepository, PostgresToolCallRepository, PostgresToolSourceRepository,
};

/// Factory for creating repositories from storage backend

pub fn create_task_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn TaskRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryTaskRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresTaskRepository::new(pool)),
    }
}

pub fn create_task_event_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn TaskEventRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryTaskEventRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresTaskEventRepository::new(pool)),
    }
}

pub fn create_approval_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn ApprovalRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryApprovalRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresApprovalRepository::new(pool)),
    }
}

pub fn create_tool_call_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn ToolCallRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryToolCallRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresToolCallRepository::new(pool)),
    }
}

pub fn create_tool_source_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn ToolSourceRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryToolSourceRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresToolSourceRepository::new(pool)),
    }
}

pub fn create_access_policy_repository(
    backend: &StorageBackend,
    pool: sqlx::PgPool,
) -> Arc<dyn AccessPolicyRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAccessPolicyRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresAccessPolicyRepository::new(pool)),
    }
}

pub fn create_credential_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn CredentialRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryCredentialRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresCredentialRepository::new(pool)),
    }
}

pub fn create_anonymous_session_repository(
    backend: &StorageBackend,
    pool: sqlx::PgPool,
) -> Arc<dyn AnonymousSessionRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAnonymousSessionRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresAnonymousSessionRepository::new(pool)),
    }
}

pub fn create_oauth_client_repository(backend: &StorageBackend, pool: sqlx::PgPool) -> Arc<dyn OAuthClientRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryOAuthClientRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresOAuthClientRepository::new(pool)),
    }
}

pub fn create_authorization_code_repository(
    backend: &StorageBackend,
    pool: sqlx::PgPool,
) -> Arc<dyn AuthorizationCodeRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAuthorizationCodeRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresAuthorizationCodeRepository::new(pool)),
    }
}

pub fn create_oauth_signing_key_repository(
    backend: &StorageBackend,
    pool: sqlx::PgPool,
) -> Arc<dyn OAuthSigningKeyRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryOAuthSigningKeyRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresOAuthSigningKeyRepository::new(pool)),
    }
}

pub fn create_inventory_state_repository(
    backend: &StorageBackend,
    pool: sqlx::PgPool,
) -> Arc<dyn InventoryStateRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryInventoryStateRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresInventoryStateRepository::new(pool)),
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
