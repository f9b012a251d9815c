//! Offload Simulation Engine
//!
//! Discrete-event simulator for battery-aware task placement on a robot that
//! can run work locally, on a nearby EDGE server or in the CLOUD.

pub mod battery;
pub mod config;
pub mod dispatcher;
pub mod energy;
pub mod event_queue;
pub mod metrics;
pub mod network;
pub mod policy;
pub mod simulator;
pub mod station;
pub mod sweep;
pub mod workload;

pub use battery::BatteryAccount;
pub use config::{ConfigError, SimulationConfig};
pub use dispatcher::Dispatcher;
pub use metrics::{Metrics, MetricsCollector, SummaryStatistics};
pub use network::NetworkLink;
pub use policy::{BatteryThresholdPolicy, DispatchPolicy, FixedSitePolicy};
pub use simulator::{FixedCountDiscipline, RunOutcome, Simulation, StopReason};
pub use station::ResourceStation;
