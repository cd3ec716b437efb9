// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Task aggregate: the state machine for a submitted code-execution run.
//!
//! Mirrors the guarded-transition style used throughout this codebase's
//! execution tracking: every transition is a method that checks the
//! current status and returns a typed error on violation, never a panic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::workspace::{AccountId, WorkspaceId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(format!("task_{}", Uuid::new_v4()))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
    Denied,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Denied
        )
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task is not queued")]
    NotQueued,
    #[error("task is not in a pre-terminal state")]
    NotPreTerminal,
    #[error("code must not be empty")]
    EmptyCode,
    #[error("unknown runtime id: {0}")]
    UnknownRuntime(String),
    #[error("runtime {0} is not enabled for this deployment")]
    RuntimeDisabled(String),
    #[error("actor mismatch: submitted actor does not match authenticated actor")]
    ActorMismatch,
}

/// A single code-execution request.
///
/// Invariant: `status` transitions form a DAG with exactly one terminal
/// state; once terminal, `status` and `completed_at` never change again
/// (enforced by every transition method below returning early/idempotently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub code: String,
    pub runtime_id: String,
    pub timeout_ms: u64,
    pub metadata: HashMap<String, Value>,
    pub workspace_id: WorkspaceId,
    pub account_id: AccountId,
    pub actor_id: String,
    pub client_id: Option<String>,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub next_event_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct TaskSubmission {
    pub code: String,
    pub runtime_id: String,
    pub timeout_ms: u64,
    pub metadata: HashMap<String, Value>,
    pub workspace_id: WorkspaceId,
    pub account_id: AccountId,
    pub actor_id: String,
    pub client_id: Option<String>,
}

impl Task {
    /// Validates and constructs a new task in `queued` status.
    ///
    /// `enabled_runtimes` is the deployment's allow-list; an empty slice
    /// means "no runtime restriction" (useful for the in-memory/test
    /// backend where every runtime id is accepted).
    pub fn submit(
        submission: TaskSubmission,
        enabled_runtimes: &[String],
    ) -> Result<Self, TaskError> {
        if submission.code.trim().is_empty() {
            return Err(TaskError::EmptyCode);
        }
        if submission.runtime_id.trim().is_empty() {
            return Err(TaskError::UnknownRuntime(submission.runtime_id));
        }
        if !enabled_runtimes.is_empty() && !enabled_runtimes.iter().any(|r| r == &submission.runtime_id)
        {
            return Err(TaskError::RuntimeDisabled(submission.runtime_id));
        }

        let now = Utc::now();
        Ok(Self {
            id: TaskId::new(),
            code: submission.code,
            runtime_id: submission.runtime_id,
            timeout_ms: submission.timeout_ms,
            metadata: submission.metadata,
            workspace_id: submission.workspace_id,
            account_id: submission.account_id,
            actor_id: submission.actor_id,
            client_id: submission.client_id,
            status: TaskStatus::Queued,
            exit_code: None,
            error: None,
            next_event_sequence: 0,
            created_at: now,
            updated_at: now,
            dispatched_at: None,
            completed_at: None,
        })
    }

    /// Allocates the next strictly-increasing event sequence number.
    pub fn allocate_sequence(&mut self) -> u64 {
        let seq = self.next_event_sequence;
        self.next_event_sequence += 1;
        seq
    }

    /// `queued --markRunning--> running`. Idempotent: a second call when
    /// already running is a no-op (`Ok(false)`); any other state is an error.
    pub fn mark_running(&mut self) -> Result<bool, TaskError> {
        match self.status {
            TaskStatus::Queued => {
                self.status = TaskStatus::Running;
                self.updated_at = Utc::now();
                Ok(true)
            }
            TaskStatus::Running => Ok(false),
            _ => Err(TaskError::NotQueued),
        }
    }

    pub fn mark_dispatched(&mut self) {
        self.dispatched_at = Some(Utc::now());
        self.updated_at = self.dispatched_at.unwrap();
    }

    /// Any `terminal` transition: succeeds only from `{queued, running}`,
    /// idempotent thereafter (repeated calls return `Ok(false)`).
    pub fn terminate(
        &mut self,
        status: TaskStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> Result<bool, TaskError> {
        if !status.is_terminal() {
            return Err(TaskError::NotPreTerminal);
        }
        if self.status.is_terminal() {
            return Ok(false);
        }
        self.status = status;
        self.exit_code = exit_code;
        self.error = error;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(true)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn rejects_empty_code() {
        let mut s = submission();
        s.code = "  ".to_string();
        assert!(matches!(Task::submit(s, &[]), Err(TaskError::EmptyCode)));
    }

    #[test]
    fn rejects_disabled_runtime() {
        let s = submission();
        let err = Task::submit(s, &["python".to_string()]).unwrap_err();
        assert!(matches!(err, TaskError::RuntimeDisabled(_)));
    }

    #[test]
    fn new_task_is_queued_with_zero_sequence() {
        let t = Task::submit(submission(), &[]).unwrap();
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.next_event_sequence, 0);
    }

    #[test]
    fn mark_running_is_idempotent() {
        let mut t = Task::submit(submission(), &[]).unwrap();
        assert!(t.mark_running().unwrap());
        assert_eq!(t.status, TaskStatus::Running);
        assert!(!t.mark_running().unwrap());
    }

    #[test]
    fn mark_running_from_terminal_errors() {
        let mut t = Task::submit(submission(), &[]).unwrap();
        t.mark_running().unwrap();
        t.terminate(TaskStatus::Completed, Some(0), None).unwrap();
        assert!(matches!(t.mark_running(), Err(TaskError::NotQueued)));
    }

    #[test]
    fn terminate_is_idempotent_and_immutable_after() {
        let mut t = Task::submit(submission(), &[]).unwrap();
        t.mark_running().unwrap();
        assert!(t.terminate(TaskStatus::Completed, Some(0), None).unwrap());
        let completed_at = t.completed_at;
        assert!(!t.terminate(TaskStatus::Failed, Some(1), Some("x".into())).unwrap());
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.completed_at, completed_at);
    }

    #[test]
    fn terminate_from_queued_allowed_for_validation_failures() {
        let mut t = Task::submit(submission(), &[]).unwrap();
        assert!(t.terminate(TaskStatus::Denied, None, Some("policy".into())).unwrap());
        assert_eq!(t.status, TaskStatus::Denied);
    }

    #[test]
    fn sequence_allocation_is_monotonic() {
        let mut t = Task::submit(submission(), &[]).unwrap();
        assert_eq!(t.allocate_sequence(), 0);
        assert_eq!(t.allocate_sequence(), 1);
        assert_eq!(t.allocate_sequence(), 2);
    }
}
