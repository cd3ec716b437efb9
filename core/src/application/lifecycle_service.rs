// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Task lifecycle engine (§4.F): submission, dispatch, and terminal
//! reconciliation, with a `TaskEvent` appended before every transition
//! commits (§4.F, §8.2).

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use crate::domain::repository::{RepositoryError, TaskEventRepository, TaskRepository};
use crate::domain::task::{Task, TaskError, TaskId, TaskStatus, TaskSubmission};
use crate::domain::task_event::{EventType, TaskEvent};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::runtime_dispatch::{DispatchError, RuntimeRegistry};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub struct LifecycleService {
    task_repo: Arc<dyn TaskRepository>,
    event_repo: Arc<dyn TaskEventRepository>,
    event_bus: EventBus,
    runtimes: RuntimeRegistry,
    enabled_runtimes: Vec<String>,
}

impl LifecycleService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        event_repo: Arc<dyn TaskEventRepository>,
        event_bus: EventBus,
        runtimes: RuntimeRegistry,
        enabled_runtimes: Vec<String>,
    ) -> Self {
        Self { task_repo, event_repo, event_bus, runtimes, enabled_runtimes }
    }

    async fn emit(&self, task: &mut Task, event_type: EventType, payload: serde_json::Value) -> Result<(), LifecycleError> {
        let sequence = task.allocate_sequence();
        let event = TaskEvent::new(task.id.clone(), sequence, event_type, payload);
        self.event_repo.append(&event).await?;
        self.event_bus.publish(event);
        Ok(())
    }

    /// Validates and queues a submission, appending `task.created` +
    /// `task.queued` in the same mutation (§4.F "Submission").
    #[instrument(skip(self, submission), fields(runtime_id = %submission.runtime_id))]
    pub async fn submit(&self, submission: TaskSubmission) -> Result<Task, LifecycleError> {
        let mut task = Task::submit(submission, &self.enabled_runtimes)?;
        self.emit(&mut task, EventType::TaskCreated, json!({ "runtimeId": task.runtime_id })).await?;
        self.emit(&mut task, EventType::TaskQueued, serde_json::Value::Null).await?;
        self.task_repo.save(&task).await?;
        metrics::counter!("taskgate_task_submissions_total").increment(1);
        Ok(task)
    }

    /// Reads the task; if still `queued`, transitions to `running` and
    /// invokes the configured runtime worker (§4.F "Dispatch").
    #[instrument(skip(self))]
    pub async fn dispatch(&self, task_id: &TaskId) -> Result<(), LifecycleError> {
        let mut task = self.task_repo.find_by_id(task_id).await?.ok_or(RepositoryError::NotFound(task_id.0.clone()))?;

        if task.mark_running()? {
            self.emit(&mut task, EventType::TaskRunning, serde_json::Value::Null).await?;
            self.task_repo.save(&task).await?;
        }

        task.mark_dispatched();
        self.emit(&mut task, EventType::TaskDispatched, serde_json::Value::Null).await?;
        self.task_repo.save(&task).await?;

        self.runtimes.dispatch(&task).await?;
        Ok(())
    }

    /// Idempotent terminal callback (§4.F "Callbacks"): returns
    /// `already_final=true` without mutating if the task already reached a
    /// terminal status.
    #[instrument(skip(self, error))]
    pub async fn complete_run(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> Result<bool, LifecycleError> {
        let mut task = self.task_repo.find_by_id(task_id).await?.ok_or(RepositoryError::NotFound(task_id.0.clone()))?;

        let transitioned = task.terminate(status, exit_code, error.clone())?;
        if !transitioned {
            return Ok(true);
        }

        let event_type = match status {
            TaskStatus::Completed => EventType::TaskCompleted,
            TaskStatus::Failed => EventType::TaskFailed,
            TaskStatus::TimedOut => EventType::TaskTimedOut,
            TaskStatus::Denied => EventType::TaskDenied,
            _ => return Err(TaskError::NotPreTerminal.into()),
        };
        self.emit(&mut task, event_type, json!({ "exitCode": exit_code, "error": error })).await?;
        self.task_repo.save(&task).await?;

        metrics::counter!("taskgate_task_terminal_total", "status" => status_label(status)).increment(1);
        Ok(false)
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "queued",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::TimedOut => "timed_out",
        TaskStatus::Denied => "denied",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workspace::{AccountId, WorkspaceId};
    use crate::infrastructure::repositories::{InMemoryTaskEventRepository, InMemoryTaskRepository};
    use crate::infrastructure::runtime_dispatch::InProcessWorker;
    use std::collections::HashMap;
    use std::sync::Arc as StdArc;

    fn submission() -> TaskSubmission {
        TaskSubmission {
            code: "return 1 + 1".to_string(),
            runtime_id: "js".to_string(),
            timeout_ms: 30_000,
            metadata: HashMap::new(),
            workspace_id: WorkspaceId::new(),
            account_id: AccountId::new(),
            actor_id: "actor-1".to_string(),
            client_id: None,
        }
    }

    fn service_with_worker() -> (LifecycleService, StdArc<InMemoryTaskRepository>, StdArc<InMemoryTaskEventRepository>) {
        let mut registry = RuntimeRegistry::new();
        registry.register(
            "js",
            StdArc::new(InProcessWorker::new(|_id, _code, _timeout| async { Ok(()) })),
        );
        let task_repo = StdArc::new(InMemoryTaskRepository::new());
        let event_repo = StdArc::new(InMemoryTaskEventRepository::new());
        let service = LifecycleService::new(
            task_repo.clone(),
            event_repo.clone(),
            EventBus::new(16),
            registry,
            Vec::new(),
        );
        (service, task_repo, event_repo)
    }

    #[tokio::test]
    async fn submit_queues_task_and_emits_two_events() {
        let (service, _task_repo, event_repo) = service_with_worker();
        let task = service.submit(submission()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        let events = event_repo.find_by_task(&task.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::TaskCreated);
        assert_eq!(events[1].event_type, EventType::TaskQueued);
    }

    #[tokio::test]
    async fn dispatch_transitions_to_running_and_invokes_runtime() {
        let (service, task_repo, _event_repo) = service_with_worker();
        let task = service.submit(submission()).await.unwrap();
        service.dispatch(&task.id).await.unwrap();
        let stored = task_repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert!(stored.dispatched_at.is_some());
    }

    #[tokio::test]
    async fn complete_run_is_idempotent() {
        let (service, task_repo, _event_repo) = service_with_worker();
        let task = service.submit(submission()).await.unwrap();
        service.dispatch(&task.id).await.unwrap();

        let first = service.complete_run(&task.id, TaskStatus::Completed, Some(0), None).await.unwrap();
        let second = service.complete_run(&task.id, TaskStatus::Failed, Some(1), Some("x".into())).await.unwrap();
        assert!(!first);
        assert!(second);

        let stored = task_repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }
}
