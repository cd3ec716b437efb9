// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! The internal runtime callback surface (S6.3): the two endpoints a
//! sandbox worker calls back into — mediate a tool call issued by the
//! code under execution, and report the run's terminal outcome. Both
//! require the shared `internal_secret` rather than an end-user bearer
//! token.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::application::mediator_service::InvokeRequest;
use crate::domain::task::{TaskId, TaskStatus};
use crate::infrastructure::runtime_dispatch::{ToolCallCallbackErrorKind, ToolCallCallbackResult};

use super::error::ApiError;
use super::state::AppState;

fn require_internal_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !bool::from(provided.as_bytes().ct_eq(state.config.internal_token.as_bytes())) {
        return Err(ApiError::unauthorized("invalid_token", None));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
    pub input: Value,
}

/// `POST /internal/tool-call`: runs the mediator on behalf of the calling
/// runtime and returns its outcome in the §6.3 callback-result shape.
pub async fn handle_tool_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ToolCallRequest>,
) -> Result<Json<ToolCallCallbackResult>, ApiError> {
    require_internal_secret(&state, &headers)?;

    let task_id = TaskId(req.task_id);
    let mut task = state
        .task_repo
        .find_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown task: {}", task_id.0)))?;

    let snapshot = state
        .inventory
        .build(task.workspace_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let mut sequence = task.next_event_sequence;
    let invoke_req = InvokeRequest {
        task_id: task.id.clone(),
        call_id: req.call_id,
        tool_path: req.tool_path,
        input: req.input,
        workspace_id: task.workspace_id,
        actor_id: task.actor_id.clone(),
        client_id: task.client_id.clone(),
        snapshot: snapshot.as_ref(),
    };

    let outcome = state
        .mediator
        .invoke_tool(invoke_req, || {
            let seq = sequence;
            sequence += 1;
            seq
        })
        .await;

    task.next_event_sequence = sequence;
    state.task_repo.save(&task).await?;

    let result = match outcome {
        Ok(value) => ToolCallCallbackResult::Ok { value },
        Err(crate::domain::tool_call::MediatorFailure::Pending { approval_id, retry_after_ms }) => {
            ToolCallCallbackResult::Err {
                kind: ToolCallCallbackErrorKind::Pending,
                error: None,
                approval_id: Some(approval_id.0),
                retry_after_ms: Some(retry_after_ms),
            }
        }
        Err(crate::domain::tool_call::MediatorFailure::Denied { error }) => ToolCallCallbackResult::Err {
            kind: ToolCallCallbackErrorKind::Denied,
            error: Some(error),
            approval_id: None,
            retry_after_ms: None,
        },
        Err(crate::domain::tool_call::MediatorFailure::Failed { error }) => ToolCallCallbackResult::Err {
            kind: ToolCallCallbackErrorKind::Failed,
            error: Some(error),
            approval_id: None,
            retry_after_ms: None,
        },
    };

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRunRequest {
    pub task_id: String,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompleteRunResponse {
    pub ok: bool,
    pub already_final: bool,
}

/// `POST /internal/run-complete`: idempotent terminal-status callback
/// (S4.F "Callbacks").
pub async fn complete_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteRunRequest>,
) -> Result<Json<CompleteRunResponse>, ApiError> {
    require_internal_secret(&state, &headers)?;

    let task_id = TaskId(req.task_id);
    let already_final = state
        .lifecycle
        .complete_run(&task_id, req.status, req.exit_code, req.error)
        .await?;

    Ok(Json(CompleteRunResponse { ok: true, already_final }))
}
