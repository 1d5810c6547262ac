use std::sync::Arc;

use terranode_task::{TaskContext, TaskRegistry};

use crate::config::NodeConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable; inner data is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// All tasks known to this node.
    pub registry: Arc<TaskRegistry>,
    /// Shared run collaborators (supervisor, storage, dispatcher, store).
    pub ctx: Arc<TaskContext>,
    /// Node configuration.
    pub config: Arc<NodeConfig>,
}
