//! Event payloads delivered to webhook subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use terranode_core::types::ResourceType;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// A task was accepted and its run started.
pub const EVENT_TASK_CREATED: &str = "task.created";

/// A task reached Completed.
pub const EVENT_TASK_COMPLETED: &str = "task.completed";

/// A task reached Failed.
pub const EVENT_TASK_FAILED: &str = "task.failed";

/// A task reached Canceled.
pub const EVENT_TASK_CANCELED: &str = "task.canceled";

/// Managed mode: one resource group's artifacts became available.
pub const EVENT_TASK_RESOURCE: &str = "task.resource";

// ---------------------------------------------------------------------------
// TaskNotification
// ---------------------------------------------------------------------------

/// One outbound callback payload.
///
/// `task` is the public projection of the task's state at dispatch time
/// (id, name, status, progress, timings); `resource_type` is present only
/// on managed-mode per-resource events.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNotification {
    /// Dot-separated event name, e.g. `"task.completed"`.
    pub event: String,

    /// Resource tag for [`EVENT_TASK_RESOURCE`] events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,

    /// JSON projection of the task's public state.
    pub task: serde_json::Value,

    /// When the notification was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl TaskNotification {
    /// Create a notification with the required event name and task body.
    pub fn new(event: impl Into<String>, task: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            resource_type: None,
            task,
            timestamp: Utc::now(),
        }
    }

    /// Tag the notification with an available resource type.
    pub fn with_resource(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_tag_omitted_unless_set() {
        let plain = TaskNotification::new(EVENT_TASK_CREATED, serde_json::json!({"id": "t1"}));
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("resource_type").is_none());
        assert_eq!(json["event"], "task.created");
        assert_eq!(json["task"]["id"], "t1");
    }

    #[test]
    fn resource_event_carries_wire_tag() {
        let event = TaskNotification::new(EVENT_TASK_RESOURCE, serde_json::json!({}))
            .with_resource(ResourceType::PointCloud);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["resource_type"], "pointcloud");
    }
}
