//! Core types shared across the offloading simulator

use serde::{Deserialize, Serialize};

use crate::error::{OffloadError, Result};

/// Task category
///
/// NAV and SLAM are safety-critical and always run on the robot. GENERIC work
/// may be offloaded depending on battery level and edge affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Nav,
    Slam,
    Generic,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Nav, TaskType::Slam, TaskType::Generic];

    /// NAV and SLAM must execute locally regardless of battery state
    pub fn is_special(self) -> bool {
        matches!(self, TaskType::Nav | TaskType::Slam)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Nav => write!(f, "NAV"),
            TaskType::Slam => write!(f, "SLAM"),
            TaskType::Generic => write!(f, "GENERIC"),
        }
    }
}

/// Execution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Local,
    Edge,
    Cloud,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Local, Site::Edge, Site::Cloud];

    /// EDGE and CLOUD are reached over a network link
    pub fn is_remote(self) -> bool {
        !matches!(self, Site::Local)
    }

    /// Lowercase name used in purposes and serialized records
    pub fn as_str(self) -> &'static str {
        match self {
            Site::Local => "local",
            Site::Edge => "edge",
            Site::Cloud => "cloud",
        }
    }

    /// Parse from a lowercase or uppercase name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Site::Local),
            "edge" => Some(Site::Edge),
            "cloud" => Some(Site::Cloud),
            _ => None,
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work to be placed on LOCAL, EDGE or CLOUD.
///
/// Fields are private so the NAV/SLAM invariant (never offloadable, no edge
/// affinity) cannot be broken after construction. Deserialization goes through
/// the same validation as [`Task::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskFields", into = "TaskFields")]
pub struct Task {
    id: u64,
    task_type: TaskType,
    size_bytes: u64,
    compute_demand: f64,
    created_at: f64,
    deadline_ms: Option<u64>,
    priority: i32,
    edge_affinity: bool,
}

impl Task {
    /// Create a task without deadline or edge affinity.
    ///
    /// # Arguments
    /// * `size_bytes` - Input payload, must be > 0
    /// * `compute_demand` - Abstract operations, must be > 0
    /// * `created_at` - Simulated creation time in seconds, must be >= 0
    pub fn new(
        id: u64,
        task_type: TaskType,
        size_bytes: u64,
        compute_demand: f64,
        created_at: f64,
    ) -> Result<Self> {
        if size_bytes == 0 {
            return Err(OffloadError::input(format!(
                "task {id}: size_bytes must be positive"
            )));
        }
        if !(compute_demand.is_finite() && compute_demand > 0.0) {
            return Err(OffloadError::input(format!(
                "task {id}: compute_demand must be positive, got {compute_demand}"
            )));
        }
        if !(created_at.is_finite() && created_at >= 0.0) {
            return Err(OffloadError::input(format!(
                "task {id}: created_at cannot be negative, got {created_at}"
            )));
        }

        Ok(Task {
            id,
            task_type,
            size_bytes,
            compute_demand,
            created_at,
            deadline_ms: None,
            priority: 0,
            edge_affinity: false,
        })
    }

    /// Attach a relative deadline (milliseconds after creation)
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Result<Self> {
        if deadline_ms == 0 {
            return Err(OffloadError::input(format!(
                "task {}: deadline_ms must be positive",
                self.id
            )));
        }
        self.deadline_ms = Some(deadline_ms);
        Ok(self)
    }

    /// Set an informational priority (lower = more important)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder form of [`Task::set_edge_affinity`]
    pub fn with_edge_affinity(mut self, affinity: bool) -> Result<Self> {
        self.set_edge_affinity(affinity)?;
        Ok(self)
    }

    /// Assign edge affinity before dispatch. Only GENERIC tasks accept it.
    pub fn set_edge_affinity(&mut self, affinity: bool) -> Result<()> {
        if self.task_type.is_special() {
            return Err(OffloadError::input(format!(
                "task {}: cannot set edge_affinity for special task type {}",
                self.id, self.task_type
            )));
        }
        self.edge_affinity = affinity;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn compute_demand(&self) -> f64 {
        self.compute_demand
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Always false for NAV/SLAM
    pub fn edge_affinity(&self) -> bool {
        self.edge_affinity
    }

    pub fn can_offload(&self) -> bool {
        !self.task_type.is_special()
    }

    /// Absolute deadline in simulated seconds, if a deadline is set
    pub fn absolute_deadline(&self) -> Option<f64> {
        self.deadline_ms
            .map(|ms| self.created_at + ms as f64 / 1000.0)
    }

    /// True once `now` is past the absolute deadline
    pub fn is_expired(&self, now: f64) -> bool {
        self.absolute_deadline().is_some_and(|deadline| now > deadline)
    }
}

/// Serialized shape of a [`Task`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskFields {
    id: u64,
    #[serde(rename = "type")]
    task_type: TaskType,
    size_bytes: u64,
    compute_demand: f64,
    #[serde(default)]
    created_at: f64,
    #[serde(default)]
    deadline_ms: Option<u64>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    edge_affinity: bool,
}

impl TryFrom<TaskFields> for Task {
    type Error = OffloadError;

    fn try_from(fields: TaskFields) -> Result<Self> {
        let mut task = Task::new(
            fields.id,
            fields.task_type,
            fields.size_bytes,
            fields.compute_demand,
            fields.created_at,
        )?
        .with_priority(fields.priority);

        if let Some(deadline_ms) = fields.deadline_ms {
            task = task.with_deadline_ms(deadline_ms)?;
        }
        if fields.edge_affinity {
            task.set_edge_affinity(true)?;
        }
        Ok(task)
    }
}

impl From<Task> for TaskFields {
    fn from(task: Task) -> Self {
        TaskFields {
            id: task.id,
            task_type: task.task_type,
            size_bytes: task.size_bytes,
            compute_demand: task.compute_demand,
            created_at: task.created_at,
            deadline_ms: task.deadline_ms,
            priority: task.priority,
            edge_affinity: task.edge_affinity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_tasks_cannot_offload() {
        let nav = Task::new(1, TaskType::Nav, 1024, 5000.0, 10.5).unwrap();
        assert!(!nav.can_offload());
        assert!(!nav.edge_affinity());

        let mut slam = Task::new(2, TaskType::Slam, 1024, 5000.0, 0.0).unwrap();
        assert!(slam.set_edge_affinity(true).unwrap_err().is_input());
        assert!(!slam.edge_affinity());
    }

    #[test]
    fn test_generic_edge_affinity() {
        let task = Task::new(3, TaskType::Generic, 1024, 1000.0, 0.0)
            .unwrap()
            .with_edge_affinity(true)
            .unwrap();
        assert!(task.can_offload());
        assert!(task.edge_affinity());
    }

    #[test]
    fn test_invalid_fields_rejected() {
        assert!(Task::new(1, TaskType::Generic, 0, 1.0, 0.0).is_err());
        assert!(Task::new(1, TaskType::Generic, 1, 0.0, 0.0).is_err());
        assert!(Task::new(1, TaskType::Generic, 1, -5.0, 0.0).is_err());
        assert!(Task::new(1, TaskType::Generic, 1, 1.0, -0.5).is_err());

        let task = Task::new(1, TaskType::Generic, 1, 1.0, 0.0).unwrap();
        assert!(task.with_deadline_ms(0).is_err());
    }

    #[test]
    fn test_absolute_deadline() {
        let task = Task::new(1, TaskType::Generic, 1024, 1000.0, 10.0)
            .unwrap()
            .with_deadline_ms(500)
            .unwrap();

        assert_eq!(task.absolute_deadline(), Some(10.5));
        assert!(!task.is_expired(10.3));
        assert!(task.is_expired(10.6));
    }

    #[test]
    fn test_task_json_roundtrip_validates() {
        let json = r#"{"id":7,"type":"GENERIC","size_bytes":2048,"compute_demand":1e6,"edge_affinity":true}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id(), 7);
        assert!(task.edge_affinity());
        assert_eq!(task.created_at(), 0.0);

        // NAV with edge affinity violates the hard rule
        let bad = r#"{"id":8,"type":"NAV","size_bytes":2048,"compute_demand":1e6,"edge_affinity":true}"#;
        assert!(serde_json::from_str::<Task>(bad).is_err());
    }

    #[test]
    fn test_site_names() {
        assert_eq!(Site::Edge.to_string(), "edge");
        assert_eq!(Site::from_name("CLOUD"), Some(Site::Cloud));
        assert_eq!(Site::from_name("mars"), None);
        assert!(!Site::Local.is_remote());
        assert_eq!(serde_json::to_string(&Site::Local).unwrap(), "\"local\"");
        assert_eq!(serde_json::to_string(&TaskType::Slam).unwrap(), "\"SLAM\"");
    }
}
