//! Per-task execution records

use serde::{Deserialize, Serialize};

use crate::types::{Site, TaskType};

/// Outcome of dispatching one task.
///
/// Produced once by the dispatcher when the task finishes and never mutated
/// afterwards. Field names are the external contract for metrics sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: u64,
    pub task_type: TaskType,
    pub execution_site: Site,

    /// SoC (%) read when the task was dispatched
    pub soc_before: f64,
    /// SoC (%) right after this task's energy was debited
    pub soc_after: f64,

    /// End-to-end latency from dispatch to completion
    pub latency_ms: f64,
    /// Energy drawn from the robot battery (always >= 0)
    pub energy_wh_delta: f64,

    pub network_up_ms: f64,
    pub network_down_ms: f64,
    pub compute_time_ms: f64,
    pub queue_wait_ms: f64,

    pub deadline_ms: Option<u64>,
    pub missed_deadline: bool,

    /// Simulated time (s) the task was dispatched
    pub dispatch_time: f64,
    /// Simulated time (s) the task completed
    pub finish_time: f64,
}

impl ExecutionRecord {
    pub fn is_remote(&self) -> bool {
        self.execution_site.is_remote()
    }

    /// Network time spent in both directions
    pub fn network_total_ms(&self) -> f64 {
        self.network_up_ms + self.network_down_ms
    }

    /// SoC percentage points consumed by this task
    pub fn soc_drop(&self) -> f64 {
        self.soc_before - self.soc_after
    }
}
