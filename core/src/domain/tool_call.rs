// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! ToolCall aggregate: the idempotency row for a single tool invocation
//! from within a task (§3, §4.G).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ApprovalId;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Requested,
    PendingApproval,
    Completed,
    Failed,
    Denied,
}

/// Outcome returned by the mediator for a single `invoke_tool` attempt.
/// Mirrors the `{pending,retryAfterMs} | {denied,error} | {failed,error}`
/// shape from §4.G; success is the plain `Ok(Value)` case.
#[derive(Debug, Clone)]
pub enum MediatorFailure {
    Pending { approval_id: ApprovalId, retry_after_ms: u64 },
    Denied { error: String },
    Failed { error: String },
}

impl std::fmt::Display for MediatorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediatorFailure::Pending { approval_id, .. } => {
                write!(f, "APPROVAL_PENDING: {}", approval_id)
            }
            MediatorFailure::Denied { error } => write!(f, "APPROVAL_DENIED: {}", error),
            MediatorFailure::Failed { error } => write!(f, "{}", error),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("already completed; output not retained")]
    AlreadyCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub task_id: TaskId,
    pub call_id: String,
    pub tool_path: String,
    pub status: ToolCallStatus,
    pub approval_id: Option<ApprovalId>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn requested(task_id: TaskId, call_id: impl Into<String>, tool_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            call_id: call_id.into(),
            tool_path: tool_path.into(),
            status: ToolCallStatus::Requested,
            approval_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Step 1 of §4.G: re-raise the stored terminal outcome for a row that
    /// already reached `completed`/`failed`/`denied`. `Ok(None)` means the
    /// caller should proceed with steps 2-6.
    pub fn check_idempotency(&self) -> Result<Option<MediatorFailure>, ToolCallError> {
        match self.status {
            ToolCallStatus::Completed => Err(ToolCallError::AlreadyCompleted),
            ToolCallStatus::Failed => Ok(Some(MediatorFailure::Failed {
                error: self.error.clone().unwrap_or_default(),
            })),
            ToolCallStatus::Denied => Ok(Some(MediatorFailure::Denied {
                error: self.error.clone().unwrap_or_default(),
            })),
            ToolCallStatus::Requested | ToolCallStatus::PendingApproval => Ok(None),
        }
    }

    pub fn mark_pending_approval(&mut self, approval_id: ApprovalId) {
        self.status = ToolCallStatus::PendingApproval;
        self.approval_id = Some(approval_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_denied(&mut self, error: impl Into<String>) {
        self.status = ToolCallStatus::Denied;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ToolCallStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = ToolCallStatus::Completed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_call_has_no_idempotent_outcome() {
        let call = ToolCall::requested(TaskId::new(), "c1", "fs.read");
        assert!(call.check_idempotency().unwrap().is_none());
    }

    #[test]
    fn completed_call_errors_on_replay() {
        let mut call = ToolCall::requested(TaskId::new(), "c1", "fs.read");
        call.mark_completed();
        assert!(matches!(call.check_idempotency(), Err(ToolCallError::AlreadyCompleted)));
    }

    #[test]
    fn denied_call_replays_stored_error() {
        let mut call = ToolCall::requested(TaskId::new(), "c1", "fs.read");
        call.mark_denied("APPROVAL_DENIED: fs.read");
        match call.check_idempotency().unwrap() {
            Some(MediatorFailure::Denied { error }) => assert_eq!(error, "APPROVAL_DENIED: fs.read"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mediator_failure_display_uses_prefixes() {
        let f = MediatorFailure::Pending {
            approval_id: ApprovalId::new(),
            retry_after_ms: 500,
        };
        assert!(f.to_string().starts_with("APPROVAL_PENDING: approval_"));
    }
}
