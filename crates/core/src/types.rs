//! Core identity and tag types.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Opaque, immutable task identity.
///
/// Serializes as the hyphenated UUID string so snapshots and webhook
/// payloads stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generate a fresh random identity.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from the hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, TaskError> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| TaskError::Configuration(format!("'{s}' is not a valid task id")))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// Which pipeline variant applies to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Full reconstruction: the primary engine runs first, post-processing
    /// follows.
    Reconstruction,
    /// Single-resource conversion: no engine invocation, only the
    /// post-processing group for the requested artifact family.
    Conversion,
}

impl Default for TaskKind {
    fn default() -> Self {
        Self::Reconstruction
    }
}

impl TaskKind {
    /// Wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reconstruction => "reconstruction",
            Self::Conversion => "conversion",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, TaskError> {
        match s {
            "reconstruction" => Ok(Self::Reconstruction),
            "conversion" => Ok(Self::Conversion),
            _ => Err(TaskError::Configuration(format!(
                "Invalid task kind: '{s}'. Must be one of: reconstruction, conversion"
            ))),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResourceType
// ---------------------------------------------------------------------------

/// One named class of output artifact, tracked independently in managed
/// mode so subscribers can react to partial availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    PointCloud,
    Mesh,
    Orthophoto,
}

impl ResourceType {
    /// Wire-format tag carried by managed-mode notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointCloud => "pointcloud",
            Self::Mesh => "mesh",
            Self::Orthophoto => "orthophoto",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, TaskError> {
        match s {
            "pointcloud" => Ok(Self::PointCloud),
            "mesh" => Ok(Self::Mesh),
            "orthophoto" => Ok(Self::Orthophoto),
            _ => Err(TaskError::Configuration(format!(
                "Invalid resource type: '{s}'. Must be one of: pointcloud, mesh, orthophoto"
            ))),
        }
    }

    /// All resource types, in pipeline order.
    pub fn all() -> [ResourceType; 3] {
        [Self::PointCloud, Self::Mesh, Self::Orthophoto]
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_round_trips_through_display() {
        let id = TaskId::new();
        let parsed = TaskId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn task_id_rejects_garbage() {
        assert!(TaskId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn task_kind_round_trip() {
        for kind in [TaskKind::Reconstruction, TaskKind::Conversion] {
            assert_eq!(TaskKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(TaskKind::from_str("demolition").is_err());
    }

    #[test]
    fn resource_type_round_trip() {
        for rt in ResourceType::all() {
            assert_eq!(ResourceType::from_str(rt.as_str()).unwrap(), rt);
        }
        assert!(ResourceType::from_str("hologram").is_err());
    }

    #[test]
    fn resource_type_serde_matches_wire_tag() {
        let json = serde_json::to_string(&ResourceType::PointCloud).unwrap();
        assert_eq!(json, "\"pointcloud\"");
    }
}
