// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Runtime dispatch (§4.F, §6.3): hands a queued `Task` to whichever
//! sandbox runtime is configured for it. The runtime itself is always
//! external per this system's non-goals; this module only speaks the two
//! wire shapes a runtime can be driven through:
//!
//! - *in-process*: an injected callback invoked directly, for runtimes that
//!   live in the same process as the orchestrator (used in tests and for
//!   the reference `js`/`python` runtimes during development).
//! - *remote*: a `RunRequest` POST to the runtime's HTTP endpoint; the
//!   runtime worker calls back asynchronously via the surface in §6.3.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::task::{Task, TaskId};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown runtime: {0}")]
    UnknownRuntime(String),
    #[error("dispatch transport error: {0}")]
    Transport(String),
}

/// A sandbox runtime able to accept a dispatched task.
#[async_trait]
pub trait RuntimeWorker: Send + Sync {
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError>;
}

/// Routes a task's `runtime_id` to the worker registered for it.
#[derive(Default, Clone)]
pub struct RuntimeRegistry {
    workers: std::collections::HashMap<String, Arc<dyn RuntimeWorker>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self { workers: std::collections::HashMap::new() }
    }

    pub fn register(&mut self, runtime_id: impl Into<String>, worker: Arc<dyn RuntimeWorker>) {
        self.workers.insert(runtime_id.into(), worker);
    }

    pub async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        let worker = self
            .workers
            .get(&task.runtime_id)
            .ok_or_else(|| DispatchError::UnknownRuntime(task.runtime_id.clone()))?;
        worker.dispatch(task).await
    }
}

#[derive(Serialize)]
struct RunRequestCallback {
    #[serde(rename = "toolCallUrl")]
    tool_call_url: String,
    #[serde(rename = "completeRunUrl")]
    complete_run_url: String,
    #[serde(rename = "internalSecret")]
    internal_secret: String,
}

#[derive(Serialize)]
struct RunRequest {
    #[serde(rename = "taskId")]
    task_id: String,
    code: String,
    #[serde(rename = "timeoutMs")]
    timeout_ms: u64,
    callback: RunRequestCallback,
}

/// Dispatches to an out-of-process sandbox worker over HTTP (§4.F, §6.3).
/// `dispatch` only submits the run; completion arrives later via the
/// `handleToolCall`/`completeRun` callback surface the presentation layer
/// exposes, authenticated by the same `internal_secret` sent here.
pub struct RemoteSandboxWorker {
    client: reqwest::Client,
    run_endpoint: String,
    callback_base_url: String,
    internal_secret: String,
}

const CALLBACK_RETRY_MAX_ATTEMPTS: u32 = 3;
const CALLBACK_RETRY_BASE_MS: u64 = 200;

impl RemoteSandboxWorker {
    pub fn new(
        run_endpoint: impl Into<String>,
        callback_base_url: impl Into<String>,
        internal_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            run_endpoint: run_endpoint.into(),
            callback_base_url: callback_base_url.into(),
            internal_secret: internal_secret.into(),
        }
    }

    /// Submits the `RunRequest`, retrying transport failures up to 3 times
    /// with 200ms × attempt backoff (§7 Retries).
    async fn submit(&self, request: &RunRequest) -> Result<(), DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.client.post(&self.run_endpoint).json(request).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if attempt >= CALLBACK_RETRY_MAX_ATTEMPTS => {
                    return Err(DispatchError::Transport(format!(
                        "run request rejected with HTTP {}",
                        resp.status()
                    )));
                }
                Err(e) if attempt >= CALLBACK_RETRY_MAX_ATTEMPTS => {
                    return Err(DispatchError::Transport(e.to_string()));
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(CALLBACK_RETRY_BASE_MS * attempt as u64)).await;
                }
            }
        }
    }
}

#[async_trait]
impl RuntimeWorker for RemoteSandboxWorker {
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        let request = RunRequest {
            task_id: task.id.0.clone(),
            code: task.code.clone(),
            timeout_ms: task.timeout_ms,
            callback: RunRequestCallback {
                tool_call_url: format!("{}/internal/tool-call", self.callback_base_url.trim_end_matches('/')),
                complete_run_url: format!("{}/internal/run-complete", self.callback_base_url.trim_end_matches('/')),
                internal_secret: self.internal_secret.clone(),
            },
        };
        self.submit(&request).await
    }
}

/// Drives a runtime that lives in the same process: the callback is an
/// injected async closure invoked directly instead of going over HTTP.
/// Used by the in-memory/test deployment mode.
pub struct InProcessWorker<F> {
    run: F,
}

impl<F, Fut> InProcessWorker<F>
where
    F: Fn(TaskId, String, u64) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), DispatchError>> + Send,
{
    pub fn new(run: F) -> Self {
        Self { run }
    }
}

#[async_trait]
impl<F, Fut> RuntimeWorker for InProcessWorker<F>
where
    F: Fn(TaskId, String, u64) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), DispatchError>> + Send,
{
    async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        (self.run)(task.id.clone(), task.code.clone(), task.timeout_ms).await
    }
}

/// Shape of a runtime callback's tool-call result, mirroring §6.3's four
/// variants over the wire. The application-layer mediator maps this onto
/// `MediatorFailure`/`Ok(Value)`.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(tag = "ok")]
pub enum ToolCallCallbackResult {
    #[serde(rename = "true")]
    Ok { value: Value },
    #[serde(rename = "false")]
    Err {
        kind: ToolCallCallbackErrorKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(rename = "approvalId", skip_serializing_if = "Option::is_none")]
        approval_id: Option<String>,
        #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallCallbackErrorKind {
    Pending,
    Denied,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workspace::{AccountId, WorkspaceId};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task() -> Task {
        Task::submit(
            crate::domain::task::TaskSubmission {
                code: "1+1".to_string(),
                runtime_id: "js".to_string(),
                timeout_ms: 1000,
                metadata: HashMap::new(),
                workspace_id: WorkspaceId::new(),
                account_id: AccountId::new(),
                actor_id: "a".to_string(),
                client_id: None,
            },
            &[],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn registry_dispatches_to_registered_runtime() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let worker: Arc<dyn RuntimeWorker> = Arc::new(InProcessWorker::new(move |_id, _code, _timeout| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        let mut registry = RuntimeRegistry::new();
        registry.register("js", worker);

        registry.dispatch(&task()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_runtime() {
        let registry = RuntimeRegistry::new();
        let err = registry.dispatch(&task()).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownRuntime(_)));
    }

    #[test]
    fn callback_result_serializes_pending_variant() {
        let result = ToolCallCallbackResult::Err {
            kind: ToolCallCallbackErrorKind::Pending,
            error: None,
            approval_id: Some("apr_1".to_string()),
            retry_after_ms: Some(2000),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["kind"], "pending");
        assert_eq!(value["approvalId"], "apr_1");
    }
}
