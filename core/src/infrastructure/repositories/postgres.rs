// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Production repository implementations backed by PostgreSQL via `sqlx`.
//! Each aggregate is stored with its identity columns broken out for
//! indexed lookups and the rest of the shape serialized to a `JSONB`
//! column, mirroring the `manifest_json` pattern this codebase already
//! uses for its other aggregates.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::approval::{Approval, ApprovalId};
use crate::domain::credential::{CredentialScope, SourceCredential};
use crate::domain::inventory::InventoryBuildState;
use crate::domain::oauth::{AuthorizationCode, OAuthClient, OAuthClientId, OAuthSigningKey};
use crate::domain::policy::AccessPolicy;
use crate::domain::repository::{
    AccessPolicyRepository, AnonymousSessionRepository, ApprovalRepository, AuthorizationCodeRepository,
    CredentialRepository, InventoryStateRepository, OAuthClientRepository, OAuthSigningKeyRepository,
    RepositoryError, TaskEventRepository, TaskRepository, ToolCallRepository, ToolSourceRepository,
};
use crate::domain::task::{Task, TaskId, TaskStatus};
use crate::domain::task_event::TaskEvent;
use crate::domain::tool_call::ToolCall;
use crate::domain::tool_source::{ToolSource, ToolSourceId};
use crate::domain::workspace::{AnonymousSession, WorkspaceId};

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, RepositoryError> {
    serde_json::from_value(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(task)?;
        let status = serde_json::to_value(task.status)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (id, workspace_id, status, created_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                body = EXCLUDED.body
            "#,
        )
        .bind(&task.id.0)
        .bind(task.workspace_id.0)
        .bind(status.as_str().unwrap_or_default())
        .bind(task.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM tasks WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, RepositoryError> {
        let status_val = serde_json::to_value(status)?;
        let rows = sqlx::query("SELECT body FROM tasks WHERE status = $1 ORDER BY created_at ASC")
            .bind(status_val.as_str().unwrap_or_default())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query("SELECT body FROM tasks WHERE workspace_id = $1 ORDER BY created_at ASC")
            .bind(workspace_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }
}

pub struct PostgresTaskEventRepository {
    pool: PgPool,
}

impl PostgresTaskEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskEventRepository for PostgresTaskEventRepository {
    async fn append(&self, event: &TaskEvent) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(event)?;
        sqlx::query(
            r#"
            INSERT INTO task_events (task_id, sequence, created_at, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (task_id, sequence) DO NOTHING
            "#,
        )
        .bind(&event.task_id.0)
        .bind(event.sequence as i64)
        .bind(event.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_task(&self, task_id: &TaskId) -> Result<Vec<TaskEvent>, RepositoryError> {
        let rows = sqlx::query("SELECT body FROM task_events WHERE task_id = $1 ORDER BY sequence ASC")
            .bind(&task_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }
}

pub struct PostgresApprovalRepository {
    pool: PgPool,
}

impl PostgresApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalRepository for PostgresApprovalRepository {
    async fn save(&self, approval: &Approval) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(approval)?;
        let status = serde_json::to_value(approval.status)?;
        sqlx::query(
            r#"
            INSERT INTO approvals (id, task_id, status, created_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                body = EXCLUDED.body
            "#,
        )
        .bind(&approval.id.0)
        .bind(&approval.task_id.0)
        .bind(status.as_str().unwrap_or_default())
        .bind(approval.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM approvals WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn find_pending_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Approval>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT a.body FROM approvals a
            JOIN tasks t ON t.id = a.task_id
            WHERE t.workspace_id = $1 AND a.status = 'pending'
            ORDER BY a.created_at ASC
            "#,
        )
        .bind(workspace_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }
}

pub struct PostgresToolCallRepository {
    pool: PgPool,
}

impl PostgresToolCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolCallRepository for PostgresToolCallRepository {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(call)?;
        sqlx::query(
            r#"
            INSERT INTO tool_calls (task_id, call_id, created_at, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (task_id, call_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(&call.task_id.0)
        .bind(&call.call_id)
        .bind(call.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, task_id: &TaskId, call_id: &str) -> Result<Option<ToolCall>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM tool_calls WHERE task_id = $1 AND call_id = $2")
            .bind(&task_id.0)
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }
}

pub struct PostgresToolSourceRepository {
    pool: PgPool,
}

impl PostgresToolSourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolSourceRepository for PostgresToolSourceRepository {
    async fn save(&self, source: &ToolSource) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(source)?;
        sqlx::query(
            r#"
            INSERT INTO tool_sources (id, workspace_id, name, updated_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(source.id.0)
        .bind(source.workspace_id.0)
        .bind(&source.name)
        .bind(source.updated_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ToolSourceId) -> Result<Option<ToolSource>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM tool_sources WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn find_by_name(&self, workspace_id: WorkspaceId, name: &str) -> Result<Option<ToolSource>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM tool_sources WHERE workspace_id = $1 AND name = $2")
            .bind(workspace_id.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<ToolSource>, RepositoryError> {
        let rows = sqlx::query("SELECT body FROM tool_sources WHERE workspace_id = $1")
            .bind(workspace_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }

    async fn delete(&self, id: ToolSourceId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tool_sources WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PostgresAccessPolicyRepository {
    pool: PgPool,
}

impl PostgresAccessPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessPolicyRepository for PostgresAccessPolicyRepository {
    async fn save(&self, policy: &AccessPolicy) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(policy)?;
        sqlx::query(
            r#"
            INSERT INTO access_policies (workspace_id, tool_path_pattern, priority, body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(policy.workspace_id.0)
        .bind(&policy.tool_path_pattern)
        .bind(policy.priority)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<AccessPolicy>, RepositoryError> {
        let rows = sqlx::query("SELECT body FROM access_policies WHERE workspace_id = $1")
            .bind(workspace_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("body"))).collect()
    }
}

pub struct PostgresCredentialRepository {
    pool: PgPool,
}

impl PostgresCredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn save(&self, credential: &SourceCredential) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(credential)?;
        sqlx::query(
            r#"
            INSERT INTO source_credentials (id, workspace_id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(credential.id.0)
        .bind(credential.workspace_id.0)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_binding(
        &self,
        workspace_id: WorkspaceId,
        source_key: &str,
        scope: CredentialScope,
        actor_id: Option<&str>,
    ) -> Result<Option<SourceCredential>, RepositoryError> {
        let rows = sqlx::query("SELECT body FROM source_credentials WHERE workspace_id = $1")
            .bind(workspace_id.0)
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let credential: SourceCredential = decode(row.get("body"))?;
            let matches = credential
                .bindings
                .iter()
                .any(|b| b.source_key == source_key && b.scope == scope && b.actor_id.as_deref() == actor_id);
            if matches {
                return Ok(Some(credential));
            }
        }
        Ok(None)
    }
}

pub struct PostgresAnonymousSessionRepository {
    pool: PgPool,
}

impl PostgresAnonymousSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnonymousSessionRepository for PostgresAnonymousSessionRepository {
    async fn save(&self, session: &AnonymousSession) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(session)?;
        sqlx::query(
            r#"
            INSERT INTO anonymous_sessions (session_id, workspace_id, created_at, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(&session.session_id)
        .bind(session.workspace_id.0)
        .bind(session.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<AnonymousSession>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM anonymous_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }
}

pub struct PostgresOAuthClientRepository {
    pool: PgPool,
}

impl PostgresOAuthClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthClientRepository for PostgresOAuthClientRepository {
    async fn save(&self, client: &OAuthClient) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(client)?;
        sqlx::query(
            r#"
            INSERT INTO oauth_clients (client_id, created_at, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (client_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(client.client_id.to_string())
        .bind(client.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, client_id: &OAuthClientId) -> Result<Option<OAuthClient>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM oauth_clients WHERE client_id = $1")
            .bind(client_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }
}

pub struct PostgresAuthorizationCodeRepository {
    pool: PgPool,
}

impl PostgresAuthorizationCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorizationCodeRepository for PostgresAuthorizationCodeRepository {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM authorization_codes")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        if count as usize >= crate::domain::oauth::MAX_PENDING_CODES {
            return Err(RepositoryError::Unknown("too many pending authorization codes".to_string()));
        }
        let body = serde_json::to_value(code)?;
        sqlx::query(
            r#"
            INSERT INTO authorization_codes (code, expires_at, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, RepositoryError> {
        let row = sqlx::query("DELETE FROM authorization_codes WHERE code = $1 RETURNING body")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn count_pending(&self) -> Result<usize, RepositoryError> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM authorization_codes")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(n as usize)
    }

    async fn purge_expired(&self) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

pub struct PostgresOAuthSigningKeyRepository {
    pool: PgPool,
}

impl PostgresOAuthSigningKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthSigningKeyRepository for PostgresOAuthSigningKeyRepository {
    async fn load_active(&self) -> Result<Option<OAuthSigningKey>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM oauth_signing_keys ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("body"))).transpose()
    }

    async fn store_active(&self, key: &OAuthSigningKey) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(key)?;
        sqlx::query(
            r#"
            INSERT INTO oauth_signing_keys (key_id, created_at, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (key_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(&key.key_id)
        .bind(key.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresInventoryStateRepository {
    pool: PgPool,
}

impl PostgresInventoryStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStateRepository for PostgresInventoryStateRepository {
    async fn load(&self, workspace_id: WorkspaceId) -> Result<InventoryBuildState, RepositoryError> {
        let row = sqlx::query("SELECT body FROM inventory_build_states WHERE workspace_id = $1")
            .bind(workspace_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => decode(r.get("body")),
            None => Ok(InventoryBuildState::default()),
        }
    }

    async fn save(&self, workspace_id: WorkspaceId, state: &InventoryBuildState) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO inventory_build_states (workspace_id, body)
            VALUES ($1, $2)
            ON CONFLICT (workspace_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(workspace_id.0)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
