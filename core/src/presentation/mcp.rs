// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! MCP transport (S4.H, S6.1): `/mcp` and `/mcp/anonymous` exposing
//! `tools/list` and `tools/call run_code` over JSON-RPC framed HTTP, plus
//! the streamable-HTTP session lifecycle (GET opens a server-push stream,
//! DELETE tears it down).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::{http::StatusCode, Json};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::application::lifecycle_service::LifecycleError;
use crate::domain::policy::Caller;
use crate::domain::task::{TaskId, TaskStatus, TaskSubmission};
use crate::domain::workspace::{AnonymousSession, WorkspaceId};

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct McpQuery {
    #[serde(rename = "workspaceId")]
    pub workspace_id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    #[serde(rename = "actorId")]
    pub actor_id: Option<String>,
}

struct AuthContext {
    workspace_id: WorkspaceId,
    actor_id: String,
    client_id: Option<String>,
}

fn resource_metadata_url(state: &AppState) -> String {
    format!("{}/.well-known/oauth-protected-resource", state.config.issuer.trim_end_matches('/'))
}

/// Resolves the caller per S4.H: bearer JWT (self-issued or external-OIDC)
/// takes precedence, then falls back to the legacy unauthenticated
/// `actorId` query param. A token whose workspace/session claims disagree
/// with the query params is a 401, not a silent override.
///
/// A request with neither a bearer token nor an explicit `actorId` is the
/// anonymous bootstrap case (S4.I's "create anonymous session" step): the
/// session named by `sessionId` (or a freshly minted one) is looked up or
/// created so a later `/authorize` call can find it.
async fn authenticate(state: &AppState, headers: &HeaderMap, query: &McpQuery) -> Result<AuthContext, ApiError> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        let claims = state
            .signing_key_cache
            .verify(token, &state.config.issuer, &state.config.mcp_audience())
            .map_err(|_| ApiError::unauthorized("invalid_token", Some(resource_metadata_url(state))))?;

        let actor_id = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::unauthorized("invalid_token", Some(resource_metadata_url(state))))?
            .to_string();

        let token_workspace = claims.get("workspace_id").and_then(Value::as_str);
        let token_session = claims.get("session_id").and_then(Value::as_str);

        if let (Some(tw), Some(qw)) = (token_workspace, query.workspace_id.as_deref()) {
            if tw != qw {
                return Err(ApiError::unauthorized("invalid_token", Some(resource_metadata_url(state))));
            }
        }
        if let (Some(ts), Some(qs)) = (token_session, query.session_id.as_deref()) {
            if ts != qs {
                return Err(ApiError::unauthorized("invalid_token", Some(resource_metadata_url(state))));
            }
        }

        let workspace_raw = token_workspace
            .or(query.workspace_id.as_deref())
            .ok_or_else(|| ApiError::Validation("workspaceId is required".into()))?;
        let workspace_id = WorkspaceId::parse(workspace_raw)
            .ok_or_else(|| ApiError::Validation("workspaceId is not a valid identifier".into()))?;

        Ok(AuthContext { workspace_id, actor_id, client_id: query.client_id.clone() })
    } else {
        let workspace_id = query
            .workspace_id
            .as_deref()
            .and_then(WorkspaceId::parse)
            .ok_or_else(|| ApiError::Validation("workspaceId is required".into()))?;

        if let Some(actor_id) = query.actor_id.clone() {
            return Ok(AuthContext { workspace_id, actor_id, client_id: query.client_id.clone() });
        }

        let session_id = AnonymousSession::resolve_session_id(query.session_id.as_deref());
        let session = match state.anon_sessions.find(&session_id).await? {
            Some(existing) => existing,
            None => {
                let fresh = AnonymousSession::new(workspace_id, Some(session_id.as_str()));
                state.anon_sessions.save(&fresh).await?;
                fresh
            }
        };
        if session.workspace_id != workspace_id {
            return Err(ApiError::unauthorized("invalid_token", Some(resource_metadata_url(state))));
        }

        Ok(AuthContext { workspace_id, actor_id: session.actor_id, client_id: query.client_id.clone() })
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

fn rpc_result(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: &Value, code: i64, message: impl Into<String>) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
}

/// `POST /mcp` and `POST /mcp/anonymous`: a single JSON-RPC call per
/// request (`tools/list` or `tools/call`).
pub async fn post(
    State(state): State<AppState>,
    Query(query): Query<McpQuery>,
    headers: HeaderMap,
    Json(req): Json<RpcRequest>,
) -> Result<Json<Value>, ApiError> {
    let auth = authenticate(&state, &headers, &query).await?;
    let _ = &req.jsonrpc;

    match req.method.as_str() {
        "tools/list" => {
            let snapshot = state
                .inventory
                .build(auth.workspace_id)
                .await
                .map_err(|e| ApiError::Internal(e.into()))?;
            let caller = Caller { actor_id: Some(auth.actor_id.clone()), client_id: auth.client_id.clone() };

            let mut visible = Vec::new();
            for def in snapshot.definitions.values() {
                let decision = state
                    .policy
                    .decide_for_tool(auth.workspace_id, &def.path, def.approval_required, &caller)
                    .await?;
                if decision == crate::domain::policy::Decision::Deny {
                    continue;
                }
                visible.push(crate::domain::tool_source::ToolDescriptor::from_definition(
                    def,
                    decision == crate::domain::policy::Decision::RequireApproval,
                ));
            }
            visible.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(Json(rpc_result(&req.id, json!({ "tools": visible }))))
        }
        "tools/call" => {
            let name = req.params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = req.params.get("arguments").cloned().unwrap_or(Value::Null);
            if name == "run_code" {
                run_code(&state, &auth, &req.id, arguments).await
            } else {
                call_tool(&state, &auth, &req.id, name, arguments).await
            }
        }
        other => Ok(Json(rpc_error(&req.id, -32601, format!("method not found: {other}")))),
    }
}

async fn run_code(state: &AppState, auth: &AuthContext, id: &Value, arguments: Value) -> Result<Json<Value>, ApiError> {
    let code = arguments.get("code").and_then(Value::as_str).unwrap_or_default().to_string();
    let runtime_id = arguments.get("runtimeId").and_then(Value::as_str).unwrap_or("js").to_string();
    let timeout_ms = arguments.get("timeoutMs").and_then(Value::as_u64).unwrap_or(30_000);

    let submission = TaskSubmission {
        code,
        runtime_id,
        timeout_ms,
        metadata: Default::default(),
        workspace_id: auth.workspace_id,
        account_id: crate::domain::workspace::AccountId::new(),
        actor_id: auth.actor_id.clone(),
        client_id: auth.client_id.clone(),
    };

    let task = match state.lifecycle.submit(submission).await {
        Ok(task) => task,
        Err(LifecycleError::Task(e)) => return Ok(Json(rpc_error(id, -32602, e.to_string()))),
        Err(other) => return Err(other.into()),
    };

    let mut receiver = state.event_bus.subscribe_task(task.id.clone());
    state.lifecycle.dispatch(&task.id).await?;

    let terminal_status = wait_for_terminal_status(&mut receiver, task.timeout_ms).await;

    let final_task = state
        .task_repo
        .find_by_id(&task.id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("task disappeared after completion: {}", task.id)))?;

    let status = terminal_status.unwrap_or(final_task.status);
    let is_error = matches!(status, TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Denied);
    let body = match &final_task.error {
        Some(err) => err.clone(),
        None => final_task.exit_code.map(|c| format!("exit_code: {c}")).unwrap_or_default(),
    };
    let text = format!("status: {}\n{}", status_wire_name(status), body);

    Ok(Json(rpc_result(
        id,
        json!({ "content": [{ "type": "text", "text": text }], "isError": is_error }),
    )))
}

async fn call_tool(state: &AppState, auth: &AuthContext, id: &Value, name: &str, arguments: Value) -> Result<Json<Value>, ApiError> {
    let snapshot = state
        .inventory
        .build(auth.workspace_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let mut sequence: u64 = 0;
    let synthetic_task_id = TaskId::new();
    let req = crate::application::mediator_service::InvokeRequest {
        task_id: synthetic_task_id,
        call_id: uuid::Uuid::new_v4().to_string(),
        tool_path: name.to_string(),
        input: arguments,
        workspace_id: auth.workspace_id,
        actor_id: auth.actor_id.clone(),
        client_id: auth.client_id.clone(),
        snapshot: snapshot.as_ref(),
    };

    match state.mediator.invoke_tool(req, || { let s = sequence; sequence += 1; s }).await {
        Ok(value) => Ok(Json(rpc_result(
            id,
            json!({ "content": [{ "type": "text", "text": value.to_string() }], "isError": false }),
        ))),
        Err(failure) => Ok(Json(rpc_result(
            id,
            json!({ "content": [{ "type": "text", "text": failure.to_string() }], "isError": true }),
        ))),
    }
}

async fn wait_for_terminal_status(
    receiver: &mut crate::infrastructure::event_bus::TaskEventReceiver,
    timeout_ms: u64,
) -> Option<TaskStatus> {
    let deadline = Duration::from_millis(timeout_ms.saturating_add(5_000));
    tokio::time::timeout(deadline, async {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(status) = event.event_type.terminal_task_status() {
                        return status;
                    }
                }
                Err(_) => return TaskStatus::Failed,
            }
        }
    })
    .await
    .ok()
}

fn status_wire_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "queued",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::TimedOut => "timed_out",
        TaskStatus::Denied => "denied",
    }
}

/// `GET /mcp`: opens the server-push half of the streamable-HTTP session.
/// There is no server-initiated traffic outside of task events, which
/// `tools/call run_code` already waits on synchronously, so this stream
/// only emits a single `endpoint` event acknowledging the session.
pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<McpQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    authenticate(&state, &headers, &query).await?;
    let stream = stream::once(async { Ok(Event::default().event("endpoint").data("ready")) });
    Ok(Sse::new(stream))
}

/// `DELETE /mcp`: session teardown. Sessions are not tracked server-side
/// beyond the event bus, so this is an acknowledgement only.
pub async fn delete(
    State(state): State<AppState>,
    Query(query): Query<McpQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authenticate(&state, &headers, &query).await?;
    Ok(StatusCode::NO_CONTENT)
}
