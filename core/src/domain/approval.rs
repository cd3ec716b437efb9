// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Approval aggregate: a pending-or-resolved human authorization decision
//! for a single tool call (§3, §4.G "Approval resolution").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn new() -> Self {
        Self(format!("approval_{}", Uuid::new_v4()))
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub task_id: TaskId,
    pub tool_path: String,
    pub input: Value,
    pub status: ApprovalStatus,
    pub reviewer_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn new(task_id: TaskId, tool_path: impl Into<String>, input: Value) -> Self {
        Self {
            id: ApprovalId::new(),
            task_id,
            tool_path: tool_path.into(),
            input,
            status: ApprovalStatus::Pending,
            reviewer_id: None,
            reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// `pending -> {approved, denied}` only, idempotent: resolving an
    /// already-terminal approval is a no-op returning `false` (§8.3),
    /// *regardless* of whether the requested decision matches the stored one.
    pub fn resolve(
        &mut self,
        decision: ApprovalDecision,
        reviewer_id: Option<String>,
        reason: Option<String>,
    ) -> bool {
        if self.status != ApprovalStatus::Pending {
            return false;
        }
        self.status = match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Denied => ApprovalStatus::Denied,
        };
        self.reviewer_id = reviewer_id;
        self.reason = reason;
        self.resolved_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_approval() -> Approval {
        Approval::new(TaskId::new(), "admin.send_announcement", Value::Null)
    }

    #[test]
    fn resolve_transitions_pending_to_approved() {
        let mut a = new_approval();
        assert!(a.resolve(ApprovalDecision::Approved, Some("r1".into()), None));
        assert_eq!(a.status, ApprovalStatus::Approved);
        assert!(a.resolved_at.is_some());
    }

    #[test]
    fn resolve_is_idempotent_no_op_on_already_resolved() {
        let mut a = new_approval();
        assert!(a.resolve(ApprovalDecision::Denied, None, Some("no".into())));
        let resolved_at = a.resolved_at;
        assert!(!a.resolve(ApprovalDecision::Approved, None, None));
        assert_eq!(a.status, ApprovalStatus::Denied);
        assert_eq!(a.resolved_at, resolved_at);
    }
}
