//! Execution record collection and summary statistics
//!
//! The simulator hands every finished [`ExecutionRecord`] to a
//! [`MetricsCollector`]. [`Metrics`] is the in-memory collector used by the
//! CLI and the sweep; it computes latency percentiles, energy and site
//! breakdowns, and checks the placement rules against what actually ran.

use offload_core::{ExecutionRecord, Site, TaskType};
use serde::{Deserialize, Serialize};

/// Tolerance for SoC comparisons across records
const SOC_TOLERANCE: f64 = 1e-6;

/// Sink for finished tasks
pub trait MetricsCollector {
    fn record(&mut self, record: ExecutionRecord);

    fn records(&self) -> &[ExecutionRecord];
}

/// Aggregate view over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_tasks: usize,

    // Latency (ms)
    pub latency_mean_ms: f64,
    pub latency_median_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_min_ms: f64,
    pub latency_max_ms: f64,

    // Energy (Wh)
    pub total_energy_wh: f64,
    pub avg_energy_wh: f64,
    pub local_energy_wh: f64,
    pub remote_energy_wh: f64,

    // Placement
    pub local_count: usize,
    pub edge_count: usize,
    pub cloud_count: usize,
    pub local_ratio: f64,
    pub edge_ratio: f64,
    pub cloud_ratio: f64,

    pub nav_count: usize,
    pub slam_count: usize,
    pub generic_count: usize,

    // Deadlines
    pub tasks_with_deadline: usize,
    pub deadline_misses: usize,
    pub deadline_miss_ratio: f64,

    // Battery (%)
    pub initial_soc: f64,
    pub final_soc: f64,
    pub min_soc: f64,
    pub soc_drop: f64,

    // Remote execution breakdown (ms, averaged over EDGE/CLOUD tasks)
    pub avg_network_up_ms: f64,
    pub avg_network_down_ms: f64,
    pub avg_remote_queue_wait_ms: f64,
    pub avg_remote_compute_ms: f64,

    /// Simulated time from first dispatch to last completion (s)
    pub duration_s: f64,
}

/// Outcome of checking records against the placement rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleValidation {
    pub checked: usize,
    pub violations: Vec<String>,
}

impl RuleValidation {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// In-memory collector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    records: Vec<ExecutionRecord>,
    initial_soc: Option<f64>,
}

impl MetricsCollector for Metrics {
    fn record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// SoC before the first task, used when the run dispatched nothing
    pub fn with_initial_soc(initial_soc: f64) -> Self {
        Metrics {
            records: Vec::new(),
            initial_soc: Some(initial_soc),
        }
    }

    pub fn from_records(records: Vec<ExecutionRecord>) -> Self {
        Metrics {
            records,
            initial_soc: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn summary(&self) -> SummaryStatistics {
        let records = &self.records;
        if records.is_empty() {
            let soc = self.initial_soc.unwrap_or(0.0);
            return SummaryStatistics {
                initial_soc: soc,
                final_soc: soc,
                min_soc: soc,
                ..SummaryStatistics::default()
            };
        }

        let n = records.len();
        let nf = n as f64;

        let mut latencies: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();
        latencies.sort_by(f64::total_cmp);

        let site_count = |site: Site| records.iter().filter(|r| r.execution_site == site).count();
        let type_count = |t: TaskType| records.iter().filter(|r| r.task_type == t).count();
        let local_count = site_count(Site::Local);
        let edge_count = site_count(Site::Edge);
        let cloud_count = site_count(Site::Cloud);

        let total_energy_wh: f64 = records.iter().map(|r| r.energy_wh_delta).sum();
        let local_energy_wh: f64 = records
            .iter()
            .filter(|r| !r.is_remote())
            .map(|r| r.energy_wh_delta)
            .sum();

        let tasks_with_deadline = records.iter().filter(|r| r.deadline_ms.is_some()).count();
        let deadline_misses = records.iter().filter(|r| r.missed_deadline).count();

        let initial_soc = self.initial_soc.unwrap_or(records[0].soc_before);
        let final_soc = records[n - 1].soc_after;
        let min_soc = records
            .iter()
            .map(|r| r.soc_after)
            .fold(initial_soc, f64::min);

        let remote: Vec<&ExecutionRecord> = records.iter().filter(|r| r.is_remote()).collect();
        let remote_mean = |f: fn(&ExecutionRecord) -> f64| mean(remote.iter().map(|r| f(r)));

        let first_dispatch = records.iter().map(|r| r.dispatch_time).fold(f64::INFINITY, f64::min);
        let last_finish = records.iter().map(|r| r.finish_time).fold(0.0, f64::max);

        SummaryStatistics {
            total_tasks: n,

            latency_mean_ms: latencies.iter().sum::<f64>() / nf,
            latency_median_ms: percentile(&latencies, 50.0),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p95_ms: percentile(&latencies, 95.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            latency_min_ms: latencies[0],
            latency_max_ms: latencies[n - 1],

            total_energy_wh,
            avg_energy_wh: total_energy_wh / nf,
            local_energy_wh,
            remote_energy_wh: total_energy_wh - local_energy_wh,

            local_count,
            edge_count,
            cloud_count,
            local_ratio: local_count as f64 / nf,
            edge_ratio: edge_count as f64 / nf,
            cloud_ratio: cloud_count as f64 / nf,

            nav_count: type_count(TaskType::Nav),
            slam_count: type_count(TaskType::Slam),
            generic_count: type_count(TaskType::Generic),

            tasks_with_deadline,
            deadline_misses,
            deadline_miss_ratio: if tasks_with_deadline > 0 {
                deadline_misses as f64 / tasks_with_deadline as f64
            } else {
                0.0
            },

            initial_soc,
            final_soc,
            min_soc,
            soc_drop: initial_soc - final_soc,

            avg_network_up_ms: remote_mean(|r| r.network_up_ms),
            avg_network_down_ms: remote_mean(|r| r.network_down_ms),
            avg_remote_queue_wait_ms: remote_mean(|r| r.queue_wait_ms),
            avg_remote_compute_ms: remote_mean(|r| r.compute_time_ms),

            duration_s: (last_finish - first_dispatch).max(0.0),
        }
    }

    /// Check the records against the placement and battery rules.
    ///
    /// NAV/SLAM must have run locally, energy must be non-negative and
    /// `soc_after` must never rise in completion order. When
    /// `cloud_threshold` is given, every GENERIC task dispatched at or below
    /// that SoC must have gone to CLOUD.
    pub fn validate_hard_rules(&self, cloud_threshold: Option<f64>) -> RuleValidation {
        let mut violations = Vec::new();
        let mut previous_soc: Option<f64> = None;

        for r in &self.records {
            if r.task_type.is_special() && r.execution_site != Site::Local {
                violations.push(format!(
                    "task {}: {} executed on {}",
                    r.task_id, r.task_type, r.execution_site
                ));
            }

            if r.energy_wh_delta < 0.0 {
                violations.push(format!(
                    "task {}: negative energy {}",
                    r.task_id, r.energy_wh_delta
                ));
            }

            if let Some(prev) = previous_soc {
                if r.soc_after > prev + SOC_TOLERANCE {
                    violations.push(format!(
                        "task {}: SoC rose from {prev:.6} to {:.6}",
                        r.task_id, r.soc_after
                    ));
                }
            }
            previous_soc = Some(r.soc_after);

            if let Some(threshold) = cloud_threshold {
                if r.task_type == TaskType::Generic
                    && r.soc_before <= threshold
                    && r.execution_site != Site::Cloud
                {
                    violations.push(format!(
                        "task {}: GENERIC at SoC {:.2} executed on {}",
                        r.task_id, r.soc_before, r.execution_site
                    ));
                }
            }
        }

        RuleValidation {
            checked: self.records.len(),
            violations,
        }
    }

    /// `(finish_time, soc_after)` points, starting from the initial SoC
    pub fn soc_curve(&self) -> Vec<(f64, f64)> {
        let mut curve = Vec::with_capacity(self.records.len() + 1);
        let start = self
            .initial_soc
            .or_else(|| self.records.first().map(|r| r.soc_before));
        if let Some(soc) = start {
            let t0 = self.records.first().map_or(0.0, |r| r.dispatch_time);
            curve.push((t0, soc));
        }
        curve.extend(self.records.iter().map(|r| (r.finish_time, r.soc_after)));
        curve
    }
}

/// Linear-interpolation percentile over an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
