//! Synthetic task workloads
//!
//! Arrivals form a Poisson process (exponential inter-arrival times). Task
//! size, compute demand and deadline are exponentially distributed around
//! their configured means and floored so every generated task is valid.

use offload_core::{OffloadError, Result, Task, TaskType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_SIZE_BYTES: u64 = 1;
const MIN_COMPUTE_DEMAND: f64 = 1.0;
const MIN_DEADLINE_MS: u64 = 10;

/// Generator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Mean arrivals per simulated second
    pub arrival_rate: f64,
    pub nav_ratio: f64,
    pub slam_ratio: f64,
    /// Probability a GENERIC task prefers EDGE
    pub edge_affinity_ratio: f64,
    pub avg_size_bytes: f64,
    pub avg_compute_demand: f64,
    pub avg_deadline_ms: f64,
    /// Attach a deadline to every generated task
    pub with_deadlines: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            arrival_rate: 2.0,
            nav_ratio: 0.2,
            slam_ratio: 0.1,
            edge_affinity_ratio: 0.5,
            avg_size_bytes: 1_048_576.0,
            avg_compute_demand: 5e6,
            avg_deadline_ms: 1000.0,
            with_deadlines: true,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("arrival_rate", self.arrival_rate),
            ("avg_size_bytes", self.avg_size_bytes),
            ("avg_compute_demand", self.avg_compute_demand),
            ("avg_deadline_ms", self.avg_deadline_ms),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(OffloadError::config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let ratios = [
            ("nav_ratio", self.nav_ratio),
            ("slam_ratio", self.slam_ratio),
            ("edge_affinity_ratio", self.edge_affinity_ratio),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(OffloadError::config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }

        if self.nav_ratio + self.slam_ratio > 1.0 {
            return Err(OffloadError::config(format!(
                "nav_ratio + slam_ratio must not exceed 1, got {}",
                self.nav_ratio + self.slam_ratio
            )));
        }

        Ok(())
    }
}

/// Seeded task source
#[derive(Debug, Clone)]
pub struct TaskGenerator {
    config: WorkloadConfig,
    rng: StdRng,
    next_id: u64,
    inter_arrival: Exp<f64>,
    size: Exp<f64>,
    compute: Exp<f64>,
    deadline: Exp<f64>,
}

impl TaskGenerator {
    pub fn new(config: WorkloadConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        Ok(TaskGenerator {
            inter_arrival: exp(config.arrival_rate)?,
            size: exp(1.0 / config.avg_size_bytes)?,
            compute: exp(1.0 / config.avg_compute_demand)?,
            deadline: exp(1.0 / config.avg_deadline_ms)?,
            config,
            rng: StdRng::seed_from_u64(seed),
            next_id: 0,
        })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Seconds until the next arrival
    pub fn next_inter_arrival(&mut self) -> f64 {
        self.inter_arrival.sample(&mut self.rng)
    }

    /// Draw one task created at `now`
    pub fn generate_task(&mut self, now: f64) -> Result<Task> {
        let id = self.next_id;
        self.next_id += 1;

        let r: f64 = self.rng.r#gen();
        let task_type = if r < self.config.nav_ratio {
            TaskType::Nav
        } else if r < self.config.nav_ratio + self.config.slam_ratio {
            TaskType::Slam
        } else {
            TaskType::Generic
        };

        let edge_affinity = task_type == TaskType::Generic
            && self.rng.r#gen::<f64>() < self.config.edge_affinity_ratio;

        let size_bytes = (self.size.sample(&mut self.rng) as u64).max(MIN_SIZE_BYTES);
        let compute_demand = self.compute.sample(&mut self.rng).max(MIN_COMPUTE_DEMAND);

        let mut task = Task::new(id, task_type, size_bytes, compute_demand, now)?;
        if edge_affinity {
            task.set_edge_affinity(true)?;
        }
        if self.config.with_deadlines {
            let deadline_ms = (self.deadline.sample(&mut self.rng) as u64).max(MIN_DEADLINE_MS);
            task = task.with_deadline_ms(deadline_ms)?;
        }

        Ok(task)
    }

    /// `count` tasks with Poisson creation times after `start`
    pub fn make_stream(&mut self, count: usize, start: f64) -> Result<Vec<Task>> {
        let mut now = start;
        let mut tasks = Vec::with_capacity(count);
        for _ in 0..count {
            now += self.next_inter_arrival();
            tasks.push(self.generate_task(now)?);
        }

        debug!(count, end_time = now, "Generated task stream");
        Ok(tasks)
    }
}

fn exp(lambda: f64) -> Result<Exp<f64>> {
    Exp::new(lambda)
        .map_err(|e| OffloadError::config(format!("invalid exponential rate {lambda}: {e}")))
}

/// Composition of a generated stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadStatistics {
    pub total: usize,
    pub nav: usize,
    pub slam: usize,
    pub generic: usize,
    pub edge_affinity: usize,
    pub avg_size_bytes: f64,
    pub avg_compute_demand: f64,
}

/// Summarise a task list
pub fn workload_statistics(tasks: &[Task]) -> WorkloadStatistics {
    if tasks.is_empty() {
        return WorkloadStatistics::default();
    }

    let count = |t: TaskType| tasks.iter().filter(|task| task.task_type() == t).count();
    let n = tasks.len() as f64;

    WorkloadStatistics {
        total: tasks.len(),
        nav: count(TaskType::Nav),
        slam: count(TaskType::Slam),
        generic: count(TaskType::Generic),
        edge_affinity: tasks.iter().filter(|t| t.edge_affinity()).count(),
        avg_size_bytes: tasks.iter().map(|t| t.size_bytes() as f64).sum::<f64>() / n,
        avg_compute_demand: tasks.iter().map(|t| t.compute_demand()).sum::<f64>() / n,
    }
}
