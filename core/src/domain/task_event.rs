// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Append-only task event log entries (§3 TaskEvent, §6.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Task,
    Approval,
}

/// `type:"<ns>.<verb>"` values enumerated in §6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCreated,
    TaskQueued,
    TaskRunning,
    TaskDispatched,
    TaskCompleted,
    TaskFailed,
    TaskTimedOut,
    TaskDenied,
    ToolCallStarted,
    ToolCallCompleted,
    ToolCallFailed,
    ToolCallDenied,
    ApprovalRequested,
    ApprovalResolved,
}

impl EventType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventType::TaskCreated => "task.created",
            EventType::TaskQueued => "task.queued",
            EventType::TaskRunning => "task.running",
            EventType::TaskDispatched => "task.dispatched",
            EventType::TaskCompleted => "task.completed",
            EventType::TaskFailed => "task.failed",
            EventType::TaskTimedOut => "task.timed_out",
            EventType::TaskDenied => "task.denied",
            EventType::ToolCallStarted => "tool.call.started",
            EventType::ToolCallCompleted => "tool.call.completed",
            EventType::ToolCallFailed => "tool.call.failed",
            EventType::ToolCallDenied => "tool.call.denied",
            EventType::ApprovalRequested => "approval.requested",
            EventType::ApprovalResolved => "approval.resolved",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventType::ApprovalRequested | EventType::ApprovalResolved => EventCategory::Approval,
            _ => EventCategory::Task,
        }
    }

    /// The terminal task status a terminal event type corresponds to, for
    /// the event-sequence-monotonicity testable property (§8.2).
    pub fn terminal_task_status(&self) -> Option<crate::domain::task::TaskStatus> {
        use crate::domain::task::TaskStatus;
        match self {
            EventType::TaskCompleted => Some(TaskStatus::Completed),
            EventType::TaskFailed => Some(TaskStatus::Failed),
            EventType::TaskTimedOut => Some(TaskStatus::TimedOut),
            EventType::TaskDenied => Some(TaskStatus::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub sequence: u64,
    pub event_name: EventCategory,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, sequence: u64, event_type: EventType, payload: Value) -> Self {
        Self {
            task_id,
            event_name: event_type.category(),
            sequence,
            event_type,
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_spec_strings() {
        assert_eq!(EventType::TaskTimedOut.wire_name(), "task.timed_out");
        assert_eq!(EventType::ToolCallDenied.wire_name(), "tool.call.denied");
        assert_eq!(EventType::ApprovalResolved.wire_name(), "approval.resolved");
    }

    #[test]
    fn terminal_event_types_map_to_task_status() {
        use crate::domain::task::TaskStatus;
        assert_eq!(EventType::TaskDenied.terminal_task_status(), Some(TaskStatus::Denied));
        assert_eq!(EventType::TaskDispatched.terminal_task_status(), None);
    }
}
