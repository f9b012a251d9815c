//! Batch experiments
//!
//! Two kinds of sweep are supported: an initial-SoC × policy grid, and a
//! [`SweepSpec`] that applies labelled overrides to sections of a base
//! configuration. Every point reuses its configuration's seed, so all
//! policies see the same task stream. Bad SoC levels or policy names abort
//! the sweep before anything runs; a point that fails while running is
//! reported with its error.

use std::collections::BTreeMap;
use std::path::Path;

use offload_core::{ensure_soc, OffloadError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{ConfigError, SimulationConfig};
use crate::metrics::SummaryStatistics;
use crate::policy::policy_from_name;
use crate::simulator::{FixedCountDiscipline, Simulation, StopReason};

/// Outcome of one sweep point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub label: String,
    pub initial_soc: f64,
    pub policy: String,
    pub seed: u64,
    pub summary: Option<SummaryStatistics>,
    pub stop_reason: Option<StopReason>,
    pub skipped: usize,
    pub rules_valid: bool,
    pub error: Option<String>,
}

impl SweepPoint {
    fn failed(label: &str, initial_soc: f64, policy: &str, seed: u64, error: String) -> Self {
        SweepPoint {
            label: label.to_string(),
            initial_soc,
            policy: policy.to_string(),
            seed,
            summary: None,
            stop_reason: None,
            skipped: 0,
            rules_valid: false,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Run one fixed-count simulation at `initial_soc` under `policy`
pub fn run_point(
    config: &SimulationConfig,
    initial_soc: f64,
    policy: &str,
    discipline: FixedCountDiscipline,
) -> SweepPoint {
    let mut point_config = config.clone();
    point_config.battery.initial_soc = initial_soc;
    run_labelled(&point_config, &soc_label(initial_soc), policy, discipline)
}

/// Run one fixed-count simulation of `config` under `policy`
pub fn run_labelled(
    config: &SimulationConfig,
    label: &str,
    policy: &str,
    discipline: FixedCountDiscipline,
) -> SweepPoint {
    let initial_soc = config.battery.initial_soc;
    let outcome = policy_from_name(policy)
        .and_then(|policy| Simulation::new(config, policy))
        .and_then(|sim| sim.run_generated(config.num_tasks, discipline));

    match outcome {
        Ok(outcome) => {
            let validation = outcome.validate_hard_rules();
            if !validation.passed() {
                warn!(
                    label,
                    policy,
                    violations = validation.violations.len(),
                    "Hard rules violated"
                );
            }
            SweepPoint {
                label: label.to_string(),
                initial_soc,
                policy: outcome.policy_name.clone(),
                seed: config.seed,
                summary: Some(outcome.metrics().summary()),
                stop_reason: Some(outcome.stop_reason),
                skipped: outcome.skipped,
                rules_valid: validation.passed(),
                error: None,
            }
        }
        Err(e) => {
            warn!(label, policy, error = %e, "Sweep point failed");
            SweepPoint::failed(label, initial_soc, policy, config.seed, e.to_string())
        }
    }
}

fn soc_label(soc: f64) -> String {
    format!("soc_{soc}")
}

/// Reject bad SoC levels and unknown policies before a sweep starts
pub fn check_sweep_inputs(initial_socs: &[f64], policies: &[String]) -> offload_core::Result<()> {
    for &soc in initial_socs {
        ensure_soc(soc)?;
    }
    for policy in policies {
        policy_from_name(policy)?;
    }
    Ok(())
}

/// Parse a comma-separated list of SoC levels
pub fn parse_soc_levels(list: &str) -> offload_core::Result<Vec<f64>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let soc = s
                .parse::<f64>()
                .map_err(|_| OffloadError::input(format!("invalid SoC value '{s}'")))?;
            ensure_soc(soc)?;
            Ok(soc)
        })
        .collect()
}

/// Run every `(soc, policy)` pair sequentially, SoC-major
pub fn run_soc_sweep(
    config: &SimulationConfig,
    initial_socs: &[f64],
    policies: &[String],
    discipline: FixedCountDiscipline,
) -> offload_core::Result<Vec<SweepPoint>> {
    check_sweep_inputs(initial_socs, policies)?;
    info!(
        points = initial_socs.len() * policies.len(),
        tasks = config.num_tasks,
        "Starting sweep"
    );

    let mut points = Vec::with_capacity(initial_socs.len() * policies.len());
    for &soc in initial_socs {
        for policy in policies {
            points.push(run_point(config, soc, policy, discipline));
        }
    }
    Ok(points)
}

/// One labelled set of values merged into a configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledOverride {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// Base configuration plus per-section overrides to try
///
/// ```json
/// {
///   "name": "bandwidth",
///   "base": { "num_tasks": 100 },
///   "parameters": {
///     "edge_link": [
///       { "label": "slow_edge", "bw_up_mbps": 5.0 },
///       { "label": "fast_edge", "bw_up_mbps": 200.0 }
///     ]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub base: SimulationConfig,

    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<LabelledOverride>>,
}

impl SweepSpec {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let spec: SweepSpec = serde_json::from_str(json)?;
        spec.base.validate()?;
        Ok(spec)
    }

    /// Expand into labelled configurations, sections in name order
    ///
    /// Each override replaces only the keys it names within its section.
    /// With no overrides the base runs alone as `baseline`.
    pub fn configurations(&self) -> Result<Vec<(String, SimulationConfig)>, ConfigError> {
        if self.parameters.values().all(Vec::is_empty) {
            return Ok(vec![("baseline".to_string(), self.base.clone())]);
        }

        let base = serde_json::to_value(&self.base)?;
        let mut configs = Vec::new();
        for (section, overrides) in &self.parameters {
            for (i, entry) in overrides.iter().enumerate() {
                let label = entry
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("{section}_{}", i + 1));

                let mut merged = base.clone();
                let target = merged
                    .get_mut(section)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| {
                        OffloadError::config(format!("unknown sweep section '{section}'"))
                    })?;
                for (key, value) in &entry.values {
                    if !target.contains_key(key) {
                        return Err(OffloadError::config(format!(
                            "unknown parameter '{key}' in section '{section}' ({label})"
                        ))
                        .into());
                    }
                    target.insert(key.clone(), value.clone());
                }

                let config: SimulationConfig = serde_json::from_value(merged)?;
                config.validate()?;
                configs.push((label, config));
            }
        }
        Ok(configs)
    }
}

/// Run every `(configuration, policy)` pair of `spec` sequentially
pub fn run_parameter_sweep(
    spec: &SweepSpec,
    policies: &[String],
    discipline: FixedCountDiscipline,
) -> Result<Vec<SweepPoint>, ConfigError> {
    let configs = spec.configurations()?;
    let socs: Vec<f64> = configs.iter().map(|(_, c)| c.battery.initial_soc).collect();
    check_sweep_inputs(&socs, policies)?;

    info!(
        name = spec.name.as_deref().unwrap_or("unnamed"),
        configurations = configs.len(),
        policies = policies.len(),
        "Starting parameter sweep"
    );

    let mut points = Vec::with_capacity(configs.len() * policies.len());
    for (label, config) in &configs {
        for policy in policies {
            points.push(run_labelled(config, label, policy, discipline));
        }
    }
    Ok(points)
}

/// Concurrent form of [`run_soc_sweep`]; point order is the same
#[cfg(feature = "async")]
pub async fn run_soc_sweep_async(
    config: SimulationConfig,
    initial_socs: Vec<f64>,
    policies: Vec<String>,
    discipline: FixedCountDiscipline,
) -> offload_core::Result<Vec<SweepPoint>> {
    check_sweep_inputs(&initial_socs, &policies)?;
    info!(
        points = initial_socs.len() * policies.len(),
        tasks = config.num_tasks,
        "Starting concurrent sweep"
    );

    let mut handles = Vec::with_capacity(initial_socs.len() * policies.len());
    for &soc in &initial_socs {
        for policy in &policies {
            let handle = tokio::task::spawn_blocking({
                let config = config.clone();
                let policy = policy.clone();
                move || run_point(&config, soc, &policy, discipline)
            });
            handles.push((soc, policy.clone(), handle));
        }
    }

    let mut points = Vec::with_capacity(handles.len());
    for (soc, policy, handle) in handles {
        match handle.await {
            Ok(point) => points.push(point),
            Err(e) => points.push(SweepPoint::failed(
                &soc_label(soc),
                soc,
                &policy,
                config.seed,
                format!("sweep task panicked: {e}"),
            )),
        }
    }
    Ok(points)
}
