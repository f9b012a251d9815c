//! Dispatch policies for task placement
//!
//! Implements the policies a run can be compared under:
//! - BatteryThreshold: NAV/SLAM local, GENERIC to CLOUD at low SoC, otherwise
//!   EDGE or LOCAL depending on edge affinity
//! - FixedSite: baseline that sends every GENERIC task to one tier

use offload_core::{ensure_soc, OffloadError, Result, Site, Task, TaskType};
use serde::{Deserialize, Serialize};

/// SoC (%) at or below which GENERIC tasks go to the cloud.
pub const BATTERY_THRESHOLD_SOC: f64 = 30.0;

/// Dispatch policy trait
///
/// Implementations must be pure: the same `(task, soc)` always yields the same
/// site, and nothing else (queue depth, link quality, history) is consulted.
pub trait DispatchPolicy: Send + Sync {
    /// Decide where a task runs given the live SoC
    fn decide(&self, task: &Task, soc: f64) -> Result<Site>;

    /// Get policy name
    fn name(&self) -> &str;

    /// SoC at or below which this policy promises to send GENERIC work to CLOUD
    fn cloud_threshold(&self) -> Option<f64> {
        None
    }
}

/// Battery-aware threshold rule
#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryThresholdPolicy;

impl BatteryThresholdPolicy {
    pub fn new() -> Self {
        BatteryThresholdPolicy
    }
}

impl DispatchPolicy for BatteryThresholdPolicy {
    fn decide(&self, task: &Task, soc: f64) -> Result<Site> {
        ensure_soc(soc)?;

        // Rule 1: NAV and SLAM never leave the robot
        if task.task_type().is_special() {
            return Ok(Site::Local);
        }

        // Rule 2: low battery, boundary included
        if soc <= BATTERY_THRESHOLD_SOC {
            return Ok(Site::Cloud);
        }

        // Rule 3: enough battery, affinity picks the tier
        if task.edge_affinity() {
            Ok(Site::Edge)
        } else {
            Ok(Site::Local)
        }
    }

    fn name(&self) -> &str {
        "BatteryThreshold"
    }

    fn cloud_threshold(&self) -> Option<f64> {
        Some(BATTERY_THRESHOLD_SOC)
    }
}

/// Baseline: every GENERIC task goes to the same site
#[derive(Debug, Clone)]
pub struct FixedSitePolicy {
    site: Site,
    name: String,
}

impl FixedSitePolicy {
    pub fn new(site: Site) -> Self {
        let name = match site {
            Site::Local => "AlwaysLocal",
            Site::Edge => "AlwaysEdge",
            Site::Cloud => "AlwaysCloud",
        };
        FixedSitePolicy {
            site,
            name: name.to_string(),
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }
}

impl DispatchPolicy for FixedSitePolicy {
    fn decide(&self, task: &Task, soc: f64) -> Result<Site> {
        ensure_soc(soc)?;

        // Baselines still respect the NAV/SLAM hard rule
        if task.task_type().is_special() {
            Ok(Site::Local)
        } else {
            Ok(self.site)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a policy from its CLI name
///
/// Accepts `threshold`, `local`, `edge`, `cloud` (case-insensitive).
pub fn policy_from_name(name: &str) -> Result<Box<dyn DispatchPolicy>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "threshold" | "battery" | "batterythreshold" => Ok(Box::new(BatteryThresholdPolicy::new())),
        "local" | "alwayslocal" => Ok(Box::new(FixedSitePolicy::new(Site::Local))),
        "edge" | "alwaysedge" => Ok(Box::new(FixedSitePolicy::new(Site::Edge))),
        "cloud" | "alwayscloud" => Ok(Box::new(FixedSitePolicy::new(Site::Cloud))),
        other => Err(OffloadError::config(format!("unknown policy: {other}"))),
    }
}

/// Aggregate view over a batch of decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStatistics {
    pub total_tasks: usize,
    pub local_count: usize,
    pub edge_count: usize,
    pub cloud_count: usize,
    pub local_ratio: f64,
    pub edge_ratio: f64,
    pub cloud_ratio: f64,
    pub special_tasks: usize,
    pub generic_tasks: usize,
}

/// Decide every task at one SoC level
pub fn batch_decide(
    policy: &dyn DispatchPolicy,
    tasks: &[Task],
    soc: f64,
) -> Result<Vec<(u64, Site)>> {
    tasks
        .iter()
        .map(|task| Ok((task.id(), policy.decide(task, soc)?)))
        .collect()
}

/// Summarise a batch of `(task, site)` decisions
pub fn dispatch_statistics(decisions: &[(TaskType, Site)]) -> DispatchStatistics {
    if decisions.is_empty() {
        return DispatchStatistics::default();
    }

    let total = decisions.len();
    let count = |site: Site| decisions.iter().filter(|(_, s)| *s == site).count();
    let local_count = count(Site::Local);
    let edge_count = count(Site::Edge);
    let cloud_count = count(Site::Cloud);
    let special_tasks = decisions.iter().filter(|(t, _)| t.is_special()).count();

    DispatchStatistics {
        total_tasks: total,
        local_count,
        edge_count,
        cloud_count,
        local_ratio: local_count as f64 / total as f64,
        edge_ratio: edge_count as f64 / total as f64,
        cloud_ratio: cloud_count as f64 / total as f64,
        special_tasks,
        generic_tasks: total - special_tasks,
    }
}
