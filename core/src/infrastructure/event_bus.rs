// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Enables real-time event streaming to MCP SSE transports and observers
// subscribed to a single task's event stream (§6.4).
//
// The broadcast channel is the live-tail path only; durable history is
// read back from TaskEventRepository, not replayed out of this bus.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::task::TaskId;
use crate::domain::task_event::TaskEvent;

/// Event bus for publishing and subscribing to task events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<TaskEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a task event to all subscribers.
    pub fn publish(&self, event: TaskEvent) {
        let _receiver_count = self.sender.send(event).unwrap_or(0);
    }

    /// Subscribe to every task's events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single task id, used by the MCP SSE
    /// transport to stream one run's events without replaying others (§7).
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        TaskEventReceiver {
            receiver: self.sender.subscribe(),
            task_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all task events
pub struct EventReceiver {
    receiver: broadcast::Receiver<TaskEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<TaskEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for a single task's events (filtered).
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<TaskEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if event.task_id == self.task_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task_event::EventType;
    use serde_json::Value;

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let task_id = TaskId::new();
        bus.publish(TaskEvent::new(task_id.clone(), 0, EventType::TaskCreated, Value::Null));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id, task_id);
    }

    #[tokio::test]
    async fn task_filtered_receiver_ignores_other_tasks() {
        let bus = EventBus::new(10);
        let task_id = TaskId::new();
        let other_id = TaskId::new();
        let mut receiver = bus.subscribe_task(task_id.clone());

        bus.publish(TaskEvent::new(other_id, 0, EventType::TaskCreated, Value::Null));
        bus.publish(TaskEvent::new(task_id.clone(), 0, EventType::TaskCreated, Value::Null));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id, task_id);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new(10);
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(TaskEvent::new(TaskId::new(), 0, EventType::TaskCreated, Value::Null));
        r1.recv().await.unwrap();
        r2.recv().await.unwrap();
    }
}
