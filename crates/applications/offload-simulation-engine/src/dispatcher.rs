//! Per-task dispatch lifecycle
//!
//! Each in-flight task is a [`TaskProcess`] state machine. The driver calls
//! [`Dispatcher::resume`] at the simulated time the process asked to wake
//! up; the process runs until its next suspension point and either returns
//! the time it wants to be resumed at or its finished [`ExecutionRecord`].
//!
//! ```text
//! Deciding ─┬─ LOCAL ──────────────► [AwaitingSlot] ─► Computing ─► billing
//!           └─ EDGE/CLOUD ─► Uplink ─► [AwaitingSlot] ─► Computing ─► Downlink ─► billing
//! ```

use offload_core::{ExecutionRecord, OffloadError, Result, Site, Task};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::battery::BatteryAccount;
use crate::energy::{ensure_result_ratio, result_size_bytes, EnergyBreakdown, PowerProfile};
use crate::network::{NetworkLink, TransmissionResult};
use crate::policy::DispatchPolicy;
use crate::station::{ProcessingRecord, Stations};

/// Where a process is between suspension points
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchPhase {
    /// Not yet decided; runs at dispatch time
    Deciding,
    /// Sending the request to EDGE/CLOUD
    Uplink,
    /// Queued behind earlier arrivals at the station
    AwaitingSlot,
    /// Being served by the station
    Computing,
    /// Receiving the result from EDGE/CLOUD
    Downlink,
    Done,
}

/// What a resumed process wants next
#[derive(Debug, Clone, PartialEq)]
pub enum Suspend {
    /// Wake me at this simulated time
    Until(f64),
    Finished(ExecutionRecord),
}

/// One task travelling through the dispatcher
#[derive(Debug, Clone)]
pub struct TaskProcess {
    task: Task,
    phase: DispatchPhase,
    dispatch_time: f64,
    soc_before: f64,
    site: Site,
    uplink: Option<TransmissionResult>,
    admission: Option<ProcessingRecord>,
    downlink: Option<TransmissionResult>,
}

impl TaskProcess {
    /// A process that will decide when first resumed at `dispatch_time`
    pub fn new(task: Task, dispatch_time: f64) -> Self {
        TaskProcess {
            task,
            phase: DispatchPhase::Deciding,
            dispatch_time,
            soc_before: 0.0,
            site: Site::Local,
            uplink: None,
            admission: None,
            downlink: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn dispatch_time(&self) -> f64 {
        self.dispatch_time
    }

    /// Chosen site; meaningful once past [`DispatchPhase::Deciding`]
    pub fn site(&self) -> Site {
        self.site
    }

    pub fn is_done(&self) -> bool {
        self.phase == DispatchPhase::Done
    }
}

/// Per-site dispatch counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total_dispatched: usize,
    pub local: usize,
    pub edge: usize,
    pub cloud: usize,
    pub completed: usize,
    pub missed_deadlines: usize,
    pub total_energy_wh: f64,
}

impl DispatchStats {
    fn record_decision(&mut self, site: Site) {
        self.total_dispatched += 1;
        match site {
            Site::Local => self.local += 1,
            Site::Edge => self.edge += 1,
            Site::Cloud => self.cloud += 1,
        }
    }

    pub fn count(&self, site: Site) -> usize {
        match site {
            Site::Local => self.local,
            Site::Edge => self.edge,
            Site::Cloud => self.cloud,
        }
    }

    /// Share of dispatched tasks sent to `site`
    pub fn ratio(&self, site: Site) -> f64 {
        if self.total_dispatched == 0 {
            return 0.0;
        }
        self.count(site) as f64 / self.total_dispatched as f64
    }
}

/// Drives tasks through policy, network, station and battery
pub struct Dispatcher {
    policy: Box<dyn DispatchPolicy>,
    edge_link: NetworkLink,
    cloud_link: NetworkLink,
    power: PowerProfile,
    result_size_ratio: f64,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        policy: Box<dyn DispatchPolicy>,
        edge_link: NetworkLink,
        cloud_link: NetworkLink,
        power: PowerProfile,
        result_size_ratio: f64,
    ) -> Result<Self> {
        power.validate()?;
        ensure_result_ratio(result_size_ratio)?;

        Ok(Dispatcher {
            policy,
            edge_link,
            cloud_link,
            power,
            result_size_ratio,
            stats: DispatchStats::default(),
        })
    }

    pub fn policy(&self) -> &dyn DispatchPolicy {
        self.policy.as_ref()
    }

    pub fn power(&self) -> &PowerProfile {
        &self.power
    }

    pub fn result_size_ratio(&self) -> f64 {
        self.result_size_ratio
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Link used to reach a remote site
    pub fn link(&self, site: Site) -> Option<&NetworkLink> {
        match site {
            Site::Local => None,
            Site::Edge => Some(&self.edge_link),
            Site::Cloud => Some(&self.cloud_link),
        }
    }

    /// Advance `process` from its current suspension point at time `now`
    pub fn resume(
        &mut self,
        process: &mut TaskProcess,
        now: f64,
        battery: &mut BatteryAccount,
        stations: &mut Stations,
    ) -> Result<Suspend> {
        match process.phase {
            DispatchPhase::Deciding => self.decide(process, now, battery, stations),
            DispatchPhase::Uplink => self.enter_station(process, now, stations),
            DispatchPhase::AwaitingSlot => {
                let admission = self.admission(process)?;
                process.phase = DispatchPhase::Computing;
                Ok(Suspend::Until(admission.finish_time))
            }
            DispatchPhase::Computing => {
                if process.site.is_remote() {
                    let down_bytes =
                        result_size_bytes(process.task.size_bytes(), self.result_size_ratio);
                    let downlink = self.remote_link(process.site)?.downlink_time(down_bytes);
                    process.downlink = Some(downlink);
                    process.phase = DispatchPhase::Downlink;
                    Ok(Suspend::Until(now + downlink.total))
                } else {
                    self.bill(process, now, battery)
                }
            }
            DispatchPhase::Downlink => self.bill(process, now, battery),
            DispatchPhase::Done => Err(OffloadError::input(format!(
                "task {} already finished",
                process.task.id()
            ))),
        }
    }

    /// Run one task to completion with no other process interleaving
    pub fn execute(
        &mut self,
        task: Task,
        now: f64,
        battery: &mut BatteryAccount,
        stations: &mut Stations,
    ) -> Result<ExecutionRecord> {
        let mut process = TaskProcess::new(task, now);
        let mut wake_at = now;
        loop {
            match self.resume(&mut process, wake_at, battery, stations)? {
                Suspend::Until(t) => wake_at = t,
                Suspend::Finished(record) => return Ok(record),
            }
        }
    }

    fn decide(
        &mut self,
        process: &mut TaskProcess,
        now: f64,
        battery: &BatteryAccount,
        stations: &mut Stations,
    ) -> Result<Suspend> {
        let soc = battery.soc();
        let site = self.policy.decide(&process.task, soc)?;

        process.soc_before = soc;
        process.site = site;
        process.dispatch_time = now;
        self.stats.record_decision(site);

        debug!(
            task_id = process.task.id(),
            task_type = %process.task.task_type(),
            soc,
            site = %site,
            "Dispatch decision"
        );

        if site.is_remote() {
            let uplink = self.remote_link(site)?.uplink_time(process.task.size_bytes());
            process.uplink = Some(uplink);
            process.phase = DispatchPhase::Uplink;
            Ok(Suspend::Until(now + uplink.total))
        } else {
            self.enter_station(process, now, stations)
        }
    }

    fn enter_station(
        &mut self,
        process: &mut TaskProcess,
        now: f64,
        stations: &mut Stations,
    ) -> Result<Suspend> {
        let admission = stations.get_mut(process.site).admit(&process.task, now)?;
        process.admission = Some(admission);

        if admission.queue_wait > 0.0 {
            process.phase = DispatchPhase::AwaitingSlot;
            Ok(Suspend::Until(admission.start_time))
        } else {
            process.phase = DispatchPhase::Computing;
            Ok(Suspend::Until(admission.finish_time))
        }
    }

    fn bill(
        &mut self,
        process: &mut TaskProcess,
        now: f64,
        battery: &mut BatteryAccount,
    ) -> Result<Suspend> {
        let admission = self.admission(process)?;

        let (energy, up_s, down_s) = match (process.uplink, process.downlink) {
            (Some(up), Some(down)) => (
                EnergyBreakdown::remote(&self.power, up.total, down.total)?,
                up.total,
                down.total,
            ),
            _ => (
                EnergyBreakdown::local(&self.power, admission.service_time)?,
                0.0,
                0.0,
            ),
        };

        let task = &process.task;
        let purpose = format!("task_{}_{}", task.id(), process.site);
        battery.consume_at(now, energy.total, &purpose, Some(task.id()))?;
        let soc_after = battery.soc();

        let latency_ms = (up_s + admission.queue_wait + admission.service_time + down_s) * 1000.0;
        let missed_deadline = task
            .deadline_ms()
            .is_some_and(|deadline| latency_ms > deadline as f64);

        self.stats.completed += 1;
        self.stats.total_energy_wh += energy.total;
        if missed_deadline {
            self.stats.missed_deadlines += 1;
        }
        process.phase = DispatchPhase::Done;

        info!(
            task_id = task.id(),
            site = %process.site,
            latency_ms,
            energy_wh = energy.total,
            soc_after,
            "Task completed"
        );

        Ok(Suspend::Finished(ExecutionRecord {
            task_id: task.id(),
            task_type: task.task_type(),
            execution_site: process.site,
            soc_before: process.soc_before,
            soc_after,
            latency_ms,
            energy_wh_delta: energy.total,
            network_up_ms: up_s * 1000.0,
            network_down_ms: down_s * 1000.0,
            compute_time_ms: admission.service_time * 1000.0,
            queue_wait_ms: admission.queue_wait * 1000.0,
            deadline_ms: task.deadline_ms(),
            missed_deadline,
            dispatch_time: process.dispatch_time,
            finish_time: now,
        }))
    }

    fn admission(&self, process: &TaskProcess) -> Result<ProcessingRecord> {
        process.admission.ok_or_else(|| {
            OffloadError::input(format!(
                "task {} resumed before station admission",
                process.task.id()
            ))
        })
    }

    fn remote_link(&self, site: Site) -> Result<&NetworkLink> {
        self.link(site)
            .ok_or_else(|| OffloadError::input(format!("no network link for site {site}")))
    }
}
