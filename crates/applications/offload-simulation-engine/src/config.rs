//! Run configuration
//!
//! Every section has defaults, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "battery": { "initial_soc": 25.0 }, "edge": { "service_rate": 8e7 } }
//! ```

use std::path::Path;

use offload_core::{OffloadError, Site};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::battery::BatteryAccount;
use crate::energy::{ensure_result_ratio, PowerProfile};
use crate::network::NetworkLink;
use crate::station::{ResourceStation, Stations};
use crate::workload::WorkloadConfig;

/// Errors from loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] OffloadError),
}

/// Battery size and starting charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_capacity_wh")]
    pub capacity_wh: f64,

    /// Starting SoC in percent
    #[serde(default = "default_initial_soc")]
    pub initial_soc: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        BatteryConfig {
            capacity_wh: default_capacity_wh(),
            initial_soc: default_initial_soc(),
        }
    }
}

fn default_capacity_wh() -> f64 {
    100.0
}

fn default_initial_soc() -> f64 {
    80.0
}

/// One tier's processing capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Operations per second
    pub service_rate: f64,

    #[serde(default = "default_station_capacity")]
    pub capacity: usize,
}

impl StationConfig {
    pub fn new(service_rate: f64) -> Self {
        StationConfig {
            service_rate,
            capacity: default_station_capacity(),
        }
    }

    pub fn build(&self, site: Site) -> offload_core::Result<ResourceStation> {
        ResourceStation::new(site, self.service_rate, self.capacity)
    }
}

fn default_station_capacity() -> usize {
    1
}

/// Robot to EDGE/CLOUD link parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub bw_up_mbps: f64,
    pub bw_down_mbps: f64,
    pub rtt_ms: f64,

    #[serde(default)]
    pub jitter_ms: f64,
}

impl LinkConfig {
    pub fn build(&self) -> offload_core::Result<NetworkLink> {
        NetworkLink::new(self.bw_up_mbps, self.bw_down_mbps, self.rtt_ms, self.jitter_ms)
    }
}

/// Everything a run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub battery: BatteryConfig,

    #[serde(default = "default_local")]
    pub local: StationConfig,

    #[serde(default = "default_edge")]
    pub edge: StationConfig,

    #[serde(default = "default_cloud")]
    pub cloud: StationConfig,

    #[serde(default = "default_edge_link")]
    pub edge_link: LinkConfig,

    #[serde(default = "default_cloud_link")]
    pub cloud_link: LinkConfig,

    #[serde(default)]
    pub power: PowerProfile,

    /// Result payload as a fraction of the request payload
    #[serde(default = "default_result_size_ratio")]
    pub result_size_ratio: f64,

    /// No new dispatches once SoC is at or below this (%)
    #[serde(default = "default_depletion_threshold_soc")]
    pub depletion_threshold_soc: f64,

    #[serde(default)]
    pub workload: WorkloadConfig,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Tasks per fixed-count run
    #[serde(default = "default_num_tasks")]
    pub num_tasks: usize,

    /// Arrival window for arrival-process runs (s)
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            battery: BatteryConfig::default(),
            local: default_local(),
            edge: default_edge(),
            cloud: default_cloud(),
            edge_link: default_edge_link(),
            cloud_link: default_cloud_link(),
            power: PowerProfile::default(),
            result_size_ratio: default_result_size_ratio(),
            depletion_threshold_soc: default_depletion_threshold_soc(),
            workload: WorkloadConfig::default(),
            seed: default_seed(),
            num_tasks: default_num_tasks(),
            duration_s: default_duration_s(),
        }
    }
}

fn default_local() -> StationConfig {
    StationConfig::new(1e7)
}

fn default_edge() -> StationConfig {
    StationConfig::new(5e7)
}

fn default_cloud() -> StationConfig {
    StationConfig::new(2e8)
}

fn default_edge_link() -> LinkConfig {
    LinkConfig {
        bw_up_mbps: 50.0,
        bw_down_mbps: 100.0,
        rtt_ms: 20.0,
        jitter_ms: 2.0,
    }
}

fn default_cloud_link() -> LinkConfig {
    LinkConfig {
        bw_up_mbps: 20.0,
        bw_down_mbps: 50.0,
        rtt_ms: 80.0,
        jitter_ms: 10.0,
    }
}

fn default_result_size_ratio() -> f64 {
    0.1
}

fn default_depletion_threshold_soc() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_num_tasks() -> usize {
    200
}

fn default_duration_s() -> f64 {
    60.0
}

impl SimulationConfig {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Report the first invalid parameter
    pub fn validate(&self) -> offload_core::Result<()> {
        self.build_battery()?;
        self.build_stations()?;
        self.edge_link.build()?;
        self.cloud_link.build()?;
        self.power.validate()?;
        self.workload.validate()?;

        ensure_result_ratio(self.result_size_ratio)?;
        if !(0.0..=100.0).contains(&self.depletion_threshold_soc) {
            return Err(OffloadError::config(format!(
                "depletion_threshold_soc must be between 0 and 100, got {}",
                self.depletion_threshold_soc
            )));
        }
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            return Err(OffloadError::config(format!(
                "duration_s must be positive, got {}",
                self.duration_s
            )));
        }

        Ok(())
    }

    pub fn build_battery(&self) -> offload_core::Result<BatteryAccount> {
        BatteryAccount::new(self.battery.capacity_wh, self.battery.initial_soc)
    }

    pub fn build_stations(&self) -> offload_core::Result<Stations> {
        Ok(Stations {
            local: self.local.build(Site::Local)?,
            edge: self.edge.build(Site::Edge)?,
            cloud: self.cloud.build(Site::Cloud)?,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
