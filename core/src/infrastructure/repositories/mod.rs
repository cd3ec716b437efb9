// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of repository abstractions
//! defined in the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! In-memory implementations here are `Arc<RwLock<HashMap<..>>>`-backed,
//! suitable for development, tests, and the single-process deployment mode.
//! `postgres` holds the production-grade adapters over the same traits.

pub mod postgres;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::domain::approval::{Approval, ApprovalId, ApprovalStatus};
use crate::domain::credential::{CredentialId, CredentialScope, SourceCredential};
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

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().unwrap();
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks.get(id).cloned())
    }

    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read().unwrap();
        let mut found: Vec<Task> = tasks.values().filter(|t| t.status == status).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read().unwrap();
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskEventRepository {
    events: Arc<RwLock<HashMap<TaskId, Vec<TaskEvent>>>>,
}

impl InMemoryTaskEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskEventRepository for InMemoryTaskEventRepository {
    async fn append(&self, event: &TaskEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().unwrap();
        events.entry(event.task_id.clone()).or_default().push(event.clone());
        Ok(())
    }

    async fn find_by_task(&self, task_id: &TaskId) -> Result<Vec<TaskEvent>, RepositoryError> {
        let events = self.events.read().unwrap();
        let mut found = events.get(task_id).cloned().unwrap_or_default();
        found.sort_by_key(|e| e.sequence);
        Ok(found)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApprovalRepository {
    approvals: Arc<RwLock<HashMap<ApprovalId, Approval>>>,
}

impl InMemoryApprovalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn save(&self, approval: &Approval) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().unwrap();
        approvals.insert(approval.id.clone(), approval.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError> {
        let approvals = self.approvals.read().unwrap();
        Ok(approvals.get(id).cloned())
    }

    async fn find_pending_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Approval>, RepositoryError> {
        // the workspace id isn't carried on Approval directly; callers join
        // through the owning Task. Here we filter by status only and rely
        // on the caller (application::mediator) to have scoped task_id.
        let _ = workspace_id;
        let approvals = self.approvals.read().unwrap();
        Ok(approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryToolCallRepository {
    calls: Arc<RwLock<HashMap<(TaskId, String), ToolCall>>>,
}

impl InMemoryToolCallRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolCallRepository for InMemoryToolCallRepository {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError> {
        let mut calls = self.calls.write().unwrap();
        calls.insert((call.task_id.clone(), call.call_id.clone()), call.clone());
        Ok(())
    }

    async fn find(&self, task_id: &TaskId, call_id: &str) -> Result<Option<ToolCall>, RepositoryError> {
        let calls = self.calls.read().unwrap();
        Ok(calls.get(&(task_id.clone(), call_id.to_string())).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryToolSourceRepository {
    sources: Arc<RwLock<HashMap<ToolSourceId, ToolSource>>>,
}

impl InMemoryToolSourceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolSourceRepository for InMemoryToolSourceRepository {
    async fn save(&self, source: &ToolSource) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().unwrap();
        sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ToolSourceId) -> Result<Option<ToolSource>, RepositoryError> {
        let sources = self.sources.read().unwrap();
        Ok(sources.get(&id).cloned())
    }

    async fn find_by_name(&self, workspace_id: WorkspaceId, name: &str) -> Result<Option<ToolSource>, RepositoryError> {
        let sources = self.sources.read().unwrap();
        Ok(sources
            .values()
            .find(|s| s.workspace_id == workspace_id && s.name == name)
            .cloned())
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<ToolSource>, RepositoryError> {
        let sources = self.sources.read().unwrap();
        Ok(sources.values().filter(|s| s.workspace_id == workspace_id).cloned().collect())
    }

    async fn delete(&self, id: ToolSourceId) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().unwrap();
        sources.remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAccessPolicyRepository {
    policies: Arc<RwLock<HashMap<WorkspaceId, Vec<AccessPolicy>>>>,
}

impl InMemoryAccessPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessPolicyRepository for InMemoryAccessPolicyRepository {
    async fn save(&self, policy: &AccessPolicy) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().unwrap();
        policies.entry(policy.workspace_id).or_default().push(policy.clone());
        Ok(())
    }

    async fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<AccessPolicy>, RepositoryError> {
        let policies = self.policies.read().unwrap();
        Ok(policies.get(&workspace_id).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCredentialRepository {
    credentials: Arc<RwLock<HashMap<CredentialId, SourceCredential>>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn save(&self, credential: &SourceCredential) -> Result<(), RepositoryError> {
        let mut credentials = self.credentials.write().unwrap();
        credentials.insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    async fn find_binding(
        &self,
        workspace_id: WorkspaceId,
        source_key: &str,
        scope: CredentialScope,
        actor_id: Option<&str>,
    ) -> Result<Option<SourceCredential>, RepositoryError> {
        let credentials = self.credentials.read().unwrap();
        for credential in credentials.values() {
            if credential.workspace_id != workspace_id {
                continue;
            }
            let matches = credential.bindings.iter().any(|b| {
                b.source_key == source_key
                    && b.scope == scope
                    && b.actor_id.as_deref() == actor_id
            });
            if matches {
                return Ok(Some(credential.clone()));
            }
        }
        Ok(None)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAnonymousSessionRepository {
    sessions: Arc<RwLock<HashMap<String, AnonymousSession>>>,
}

impl InMemoryAnonymousSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnonymousSessionRepository for InMemoryAnonymousSessionRepository {
    async fn save(&self, session: &AnonymousSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<AnonymousSession>, RepositoryError> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(session_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOAuthClientRepository {
    clients: Arc<RwLock<HashMap<OAuthClientId, OAuthClient>>>,
}

impl InMemoryOAuthClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthClientRepository for InMemoryOAuthClientRepository {
    async fn save(&self, client: &OAuthClient) -> Result<(), RepositoryError> {
        let mut clients = self.clients.write().unwrap();
        clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn find(&self, client_id: &OAuthClientId) -> Result<Option<OAuthClient>, RepositoryError> {
        let clients = self.clients.read().unwrap();
        Ok(clients.get(client_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuthorizationCodeRepository {
    codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
}

impl InMemoryAuthorizationCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCodeRepository for InMemoryAuthorizationCodeRepository {
    async fn save(&self, code: &AuthorizationCode) -> Result<(), RepositoryError> {
        let mut codes = self.codes.write().unwrap();
        if codes.len() >= crate::domain::oauth::MAX_PENDING_CODES {
            return Err(RepositoryError::Unknown("too many pending authorization codes".to_string()));
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, RepositoryError> {
        let mut codes = self.codes.write().unwrap();
        Ok(codes.remove(code))
    }

    async fn count_pending(&self) -> Result<usize, RepositoryError> {
        let codes = self.codes.read().unwrap();
        Ok(codes.len())
    }

    async fn purge_expired(&self) -> Result<usize, RepositoryError> {
        let mut codes = self.codes.write().unwrap();
        let before = codes.len();
        codes.retain(|_, c| !c.is_expired());
        Ok(before - codes.len())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOAuthSigningKeyRepository {
    key: Arc<RwLock<Option<OAuthSigningKey>>>,
}

impl InMemoryOAuthSigningKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthSigningKeyRepository for InMemoryOAuthSigningKeyRepository {
    async fn load_active(&self) -> Result<Option<OAuthSigningKey>, RepositoryError> {
        let key = self.key.read().unwrap();
        Ok(key.clone())
    }

    async fn store_active(&self, key: &OAuthSigningKey) -> Result<(), RepositoryError> {
        let mut stored = self.key.write().unwrap();
        *stored = Some(key.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryInventoryStateRepository {
    states: Arc<RwLock<HashMap<WorkspaceId, InventoryBuildState>>>,
}

impl InMemoryInventoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStateRepository for InMemoryInventoryStateRepository {
    async fn load(&self, workspace_id: WorkspaceId) -> Result<InventoryBuildState, RepositoryError> {
        let states = self.states.read().unwrap();
        Ok(states.get(&workspace_id).cloned().unwrap_or_default())
    }

    async fn save(&self, workspace_id: WorkspaceId, state: &InventoryBuildState) -> Result<(), RepositoryError> {
        let mut states = self.states.write().unwrap();
        states.insert(workspace_id, state.clone());
        Ok(())
    }
}
