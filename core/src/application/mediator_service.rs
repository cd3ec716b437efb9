// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Tool-call mediator (§4.G): the per-call procedure run for every tool
//! invocation issued from inside a task — idempotency, tool resolution,
//! policy decision, credential injection, approval gating, and dispatch.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use crate::domain::approval::{Approval, ApprovalDecision, ApprovalId};
use crate::domain::credential::CredentialScope;
use crate::domain::policy::{Caller, Decision};
use crate::domain::repository::{ApprovalRepository, RepositoryError, TaskEventRepository, ToolCallRepository};
use crate::domain::task::TaskId;
use crate::domain::task_event::{EventType, TaskEvent};
use crate::domain::tool_call::{MediatorFailure, ToolCall, ToolCallError};
use crate::domain::workspace::WorkspaceId;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::source_clients::{ToolRunContext, ToolRunError};

use super::credential_service::{CredentialResolutionError, CredentialService};
use super::inventory_service::{resolve_alias, InventorySnapshot};
use super::policy_service::PolicyService;

const DEFAULT_RETRY_AFTER_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum MediateError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything needed to mediate a single tool call: the task's identity
/// and caller context (§4.G `ctx`).
pub struct InvokeRequest<'a> {
    pub task_id: TaskId,
    pub call_id: String,
    pub tool_path: String,
    pub input: Value,
    pub workspace_id: WorkspaceId,
    pub actor_id: String,
    pub client_id: Option<String>,
    pub snapshot: &'a InventorySnapshot,
}

pub struct MediatorService {
    tool_call_repo: Arc<dyn ToolCallRepository>,
    approval_repo: Arc<dyn ApprovalRepository>,
    event_repo: Arc<dyn TaskEventRepository>,
    event_bus: EventBus,
    policy_service: PolicyService,
    credential_service: CredentialService,
}

impl MediatorService {
    pub fn new(
        tool_call_repo: Arc<dyn ToolCallRepository>,
        approval_repo: Arc<dyn ApprovalRepository>,
        event_repo: Arc<dyn TaskEventRepository>,
        event_bus: EventBus,
        policy_service: PolicyService,
        credential_service: CredentialService,
    ) -> Self {
        Self { tool_call_repo, approval_repo, event_repo, event_bus, policy_service, credential_service }
    }

    async fn emit(&self, task_id: &TaskId, sequence: u64, event_type: EventType, payload: Value) -> Result<(), MediateError> {
        let event = TaskEvent::new(task_id.clone(), sequence, event_type, payload);
        self.event_repo.append(&event).await?;
        self.event_bus.publish(event);
        Ok(())
    }

    /// Runs §4.G steps 1-6. The caller (the runtime's tool-call entry
    /// point, or its HTTP callback handler) is responsible for allocating a
    /// monotonic event sequence per task; we accept it here rather than
    /// mutate `Task` directly, since the mediator only owns ToolCall/
    /// Approval state.
    #[instrument(skip(self, req, next_sequence), fields(tool_path = %req.tool_path))]
    pub async fn invoke_tool<F>(
        &self,
        req: InvokeRequest<'_>,
        mut next_sequence: F,
    ) -> Result<Value, MediatorFailure>
    where
        F: FnMut() -> u64,
    {
        match self.run(req, &mut next_sequence).await {
            Ok(value) => Ok(value),
            Err(Outcome::Mediator(f)) => Err(f),
            Err(Outcome::Internal(e)) => Err(MediatorFailure::Failed { error: e.to_string() }),
        }
    }

    async fn run<F>(&self, req: InvokeRequest<'_>, next_sequence: &mut F) -> Result<Value, Outcome>
    where
        F: FnMut() -> u64,
    {
        // Step 1: idempotency upsert.
        let mut call = match self.tool_call_repo.find(&req.task_id, &req.call_id).await? {
            Some(existing) => {
                if let Some(failure) = existing.check_idempotency().map_err(to_failure)? {
                    return Err(Outcome::Mediator(failure));
                }
                existing
            }
            None => {
                let fresh = ToolCall::requested(req.task_id.clone(), req.call_id.clone(), req.tool_path.clone());
                self.tool_call_repo.save(&fresh).await?;
                self.emit(&req.task_id, next_sequence(), EventType::ToolCallStarted, json!({ "toolPath": req.tool_path })).await?;
                fresh
            }
        };

        // Step 2: resolve tool.
        let definition = match resolve_alias(&req.snapshot.definitions, &req.tool_path) {
            Some(def) => def,
            None => {
                let suggestions = req.snapshot.suggestion_index.suggest(&req.tool_path, 3);
                let message = format!("Unknown tool: {} (did you mean: {})", req.tool_path, suggestions.join(", "));
                call.mark_failed(message.clone());
                self.tool_call_repo.save(&call).await?;
                self.emit(&req.task_id, next_sequence(), EventType::ToolCallFailed, json!({ "error": message })).await?;
                return Err(Outcome::Mediator(MediatorFailure::Failed { error: message }));
            }
        };

        // Step 3: policy decision.
        let caller = Caller { actor_id: Some(req.actor_id.clone()), client_id: req.client_id.clone() };
        let decision = if let Some(query) = req.input.get("query").and_then(Value::as_str) {
            let source = req.tool_path.split('.').next().unwrap_or(&req.tool_path);
            self.policy_service
                .decide_for_graphql(req.workspace_id, source, query, definition.approval_required, &caller)
                .await?
                .0
        } else {
            self.policy_service
                .decide_for_tool(req.workspace_id, &req.tool_path, definition.approval_required, &caller)
                .await?
        };

        if decision == Decision::Deny {
            let error = format!("APPROVAL_DENIED: {}", req.tool_path);
            call.mark_denied(error.clone());
            self.tool_call_repo.save(&call).await?;
            self.emit(&req.task_id, next_sequence(), EventType::ToolCallDenied, json!({ "error": error })).await?;
            return Err(Outcome::Mediator(MediatorFailure::Denied { error }));
        }

        // Step 4: credential.
        let mut credential_headers = std::collections::HashMap::new();
        if let Some(spec) = &definition.credential_spec {
            let actor_scope_id = match spec.scope {
                CredentialScope::Actor => Some(req.actor_id.as_str()),
                CredentialScope::Workspace => None,
            };
            match self.credential_service.resolve_headers(spec, req.workspace_id, actor_scope_id).await {
                Ok(headers) => credential_headers = headers,
                Err(CredentialResolutionError::Missing(key, scope)) => {
                    let error = format!("Missing credential for source '{key}' ({scope:?} scope)");
                    call.mark_failed(error.clone());
                    self.tool_call_repo.save(&call).await?;
                    self.emit(&req.task_id, next_sequence(), EventType::ToolCallFailed, json!({ "error": error })).await?;
                    return Err(Outcome::Mediator(MediatorFailure::Failed { error }));
                }
                Err(other) => return Err(Outcome::Internal(other.into())),
            }
        }

        // Step 5: approval gate.
        if decision == Decision::RequireApproval {
            if let Some(approval_id) = &call.approval_id {
                let approval = self
                    .approval_repo
                    .find_by_id(approval_id)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(approval_id.0.clone()))?;
                match approval.status {
                    crate::domain::approval::ApprovalStatus::Pending => {
                        return Err(Outcome::Mediator(MediatorFailure::Pending {
                            approval_id: approval_id.clone(),
                            retry_after_ms: DEFAULT_RETRY_AFTER_MS,
                        }));
                    }
                    crate::domain::approval::ApprovalStatus::Denied => {
                        let error = format!("APPROVAL_DENIED: {}", req.tool_path);
                        call.mark_denied(error.clone());
                        self.tool_call_repo.save(&call).await?;
                        self.emit(&req.task_id, next_sequence(), EventType::ToolCallDenied, json!({ "error": error })).await?;
                        return Err(Outcome::Mediator(MediatorFailure::Denied { error }));
                    }
                    crate::domain::approval::ApprovalStatus::Approved => {}
                }
            } else {
                let approval = Approval::new(req.task_id.clone(), req.tool_path.clone(), req.input.clone());
                let approval_id = approval.id.clone();
                self.approval_repo.save(&approval).await?;
                self.emit(
                    &req.task_id,
                    next_sequence(),
                    EventType::ApprovalRequested,
                    json!({ "approvalId": approval_id.0, "toolPath": req.tool_path }),
                )
                .await?;
                call.mark_pending_approval(approval_id.clone());
                self.tool_call_repo.save(&call).await?;
                return Err(Outcome::Mediator(MediatorFailure::Pending {
                    approval_id,
                    retry_after_ms: DEFAULT_RETRY_AFTER_MS,
                }));
            }
        }

        // Step 6: dispatch.
        let runnable = req.snapshot.runnables.get(&definition.path);
        let ctx = ToolRunContext {
            task_id: req.task_id.0.clone(),
            workspace_id: req.workspace_id.to_string(),
            actor_id: req.actor_id.clone(),
            client_id: req.client_id.clone(),
            credential_headers,
        };

        let result = match runnable {
            Some(tool) => tool.runner.run(req.input.clone(), &ctx).await,
            None if definition.path == "discover" => Ok(definition.metadata.clone()),
            None => Err(ToolRunError::Upstream("tool has no runnable implementation".to_string())),
        };

        match result {
            Ok(value) => {
                call.mark_completed();
                self.tool_call_repo.save(&call).await?;
                self.emit(&req.task_id, next_sequence(), EventType::ToolCallCompleted, json!({})).await?;
                Ok(value)
            }
            Err(e) => {
                let error = e.to_string();
                call.mark_failed(error.clone());
                self.tool_call_repo.save(&call).await?;
                self.emit(&req.task_id, next_sequence(), EventType::ToolCallFailed, json!({ "error": error })).await?;
                Err(Outcome::Mediator(MediatorFailure::Failed { error }))
            }
        }
    }

    /// `resolveApproval` (§4.G "Approval resolution"): guarded to
    /// `pending -> {approved, denied}`, idempotent thereafter.
    pub async fn resolve_approval(
        &self,
        approval_id: &ApprovalId,
        decision: ApprovalDecision,
        reviewer_id: Option<String>,
        reason: Option<String>,
        next_sequence: impl FnOnce() -> u64,
    ) -> Result<bool, MediateError> {
        let mut approval = self
            .approval_repo
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(approval_id.0.clone()))?;

        let task_id = approval.task_id.clone();
        let transitioned = approval.resolve(decision, reviewer_id, reason);
        if !transitioned {
            return Ok(false);
        }
        self.approval_repo.save(&approval).await?;
        self.emit(
            &task_id,
            next_sequence(),
            EventType::ApprovalResolved,
            json!({ "approvalId": approval_id.0, "decision": format!("{decision:?}") }),
        )
        .await?;
        Ok(true)
    }
}

enum Outcome {
    Mediator(MediatorFailure),
    Internal(anyhow::Error),
}

impl From<RepositoryError> for Outcome {
    fn from(e: RepositoryError) -> Self {
        Outcome::Internal(e.into())
    }
}

impl From<CredentialResolutionError> for Outcome {
    fn from(e: CredentialResolutionError) -> Self {
        Outcome::Internal(e.into())
    }
}

fn to_failure(e: ToolCallError) -> MediatorFailure {
    MediatorFailure::Failed { error: e.to_string() }
}
