//! Discrete-event driver for offloading runs
//!
//! A [`Simulation`] owns everything a run touches (clock, event queue,
//! battery, stations, dispatcher and the seeded task generator), so two
//! simulations never share state and a run is a pure function of its
//! configuration, seed and task stream.
//!
//! The loop pops the earliest event, moves the clock there and lets the
//! affected task process run to its next suspension point. Many tasks can be
//! in flight at once; they interleave only at suspension points.

use offload_core::{ExecutionRecord, OffloadError, Result, Task};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::battery::BatteryAccount;
use crate::config::SimulationConfig;
use crate::dispatcher::{DispatchStats, Dispatcher, Suspend, TaskProcess};
use crate::event_queue::{Event, EventQueue};
use crate::metrics::{Metrics, MetricsCollector, RuleValidation};
use crate::policy::DispatchPolicy;
use crate::station::{StationStats, Stations};
use crate::workload::TaskGenerator;

/// How a fixed task list is fed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedCountDiscipline {
    /// Each task arrives at its `created_at`; tasks may overlap
    #[default]
    Open,
    /// Next task is dispatched when the previous one completes
    ClosedLoop,
}

/// Why a run stopped issuing dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every task was dispatched
    Completed,
    /// SoC reached the depletion threshold
    Depleted,
    /// Arrival window closed
    TimeBound,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Depleted => write!(f, "depleted"),
            StopReason::TimeBound => write!(f, "time bound"),
        }
    }
}

/// Result of a simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub policy_name: String,
    /// Records in completion order
    pub records: Vec<ExecutionRecord>,
    pub initial_soc: f64,
    pub final_soc: f64,
    /// Simulated time of the last event (s)
    pub final_time: f64,
    pub dispatched: usize,
    /// Arrivals refused because the battery was depleted
    pub skipped: usize,
    pub stop_reason: StopReason,
    pub station_stats: Vec<StationStats>,
    pub dispatch_stats: DispatchStats,
    /// Threshold the policy promises to honour, if any
    pub cloud_threshold: Option<f64>,
}

impl RunOutcome {
    /// Collector view over the records
    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::with_initial_soc(self.initial_soc);
        for record in &self.records {
            metrics.record(record.clone());
        }
        metrics
    }

    pub fn validate_hard_rules(&self) -> RuleValidation {
        self.metrics().validate_hard_rules(self.cloud_threshold)
    }
}

/// Where new arrivals come from
#[derive(Debug, Clone, Copy)]
enum Feed {
    Open,
    ClosedLoop { next: usize },
    Poisson { until: f64 },
}

/// One simulation run
pub struct Simulation {
    now: f64,
    events: EventQueue,
    battery: BatteryAccount,
    stations: Stations,
    dispatcher: Dispatcher,
    generator: TaskGenerator,
    depletion_threshold_soc: f64,

    feed: Feed,
    pending: Vec<Option<Task>>,
    processes: Vec<Option<TaskProcess>>,
    metrics: Metrics,

    dispatched: usize,
    skipped: usize,
    depleted: bool,
    window_closed: bool,
}

impl Simulation {
    /// Build a run from configuration, seeded from `config.seed`
    pub fn new(config: &SimulationConfig, policy: Box<dyn DispatchPolicy>) -> Result<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::new(
            policy,
            config.edge_link.build()?,
            config.cloud_link.build()?,
            config.power,
            config.result_size_ratio,
        )?;

        Self::from_parts(
            config.build_battery()?,
            config.build_stations()?,
            dispatcher,
            TaskGenerator::new(config.workload.clone(), config.seed)?,
            config.depletion_threshold_soc,
        )
    }

    /// Build a run from already-constructed components
    pub fn from_parts(
        battery: BatteryAccount,
        stations: Stations,
        dispatcher: Dispatcher,
        generator: TaskGenerator,
        depletion_threshold_soc: f64,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&depletion_threshold_soc) {
            return Err(OffloadError::config(format!(
                "depletion threshold must be between 0 and 100, got {depletion_threshold_soc}"
            )));
        }

        Ok(Simulation {
            now: 0.0,
            events: EventQueue::new(),
            battery,
            stations,
            dispatcher,
            generator,
            depletion_threshold_soc,
            feed: Feed::Open,
            pending: Vec::new(),
            processes: Vec::new(),
            metrics: Metrics::new(),
            dispatched: 0,
            skipped: 0,
            depleted: false,
            window_closed: false,
        })
    }

    pub fn battery(&self) -> &BatteryAccount {
        &self.battery
    }

    pub fn stations(&self) -> &Stations {
        &self.stations
    }

    pub fn generator_mut(&mut self) -> &mut TaskGenerator {
        &mut self.generator
    }

    /// Process exactly the given tasks (minus any refused on depletion)
    pub fn run_fixed_count(
        mut self,
        tasks: Vec<Task>,
        discipline: FixedCountDiscipline,
    ) -> Result<RunOutcome> {
        info!(
            policy = self.dispatcher.policy().name(),
            tasks = tasks.len(),
            discipline = ?discipline,
            initial_soc = self.battery.soc(),
            "Starting fixed-count run"
        );

        self.pending = tasks.into_iter().map(Some).collect();
        match discipline {
            FixedCountDiscipline::Open => {
                self.feed = Feed::Open;
                for index in 0..self.pending.len() {
                    let at = self.arrival_time(index);
                    self.events.schedule(at, Event::TaskArrival { index });
                }
            }
            FixedCountDiscipline::ClosedLoop => {
                self.feed = Feed::ClosedLoop { next: 1 };
                if !self.pending.is_empty() {
                    let at = self.arrival_time(0);
                    self.events.schedule(at, Event::TaskArrival { index: 0 });
                }
            }
        }

        self.run_loop()
    }

    /// Draw `count` tasks from the generator and run them
    pub fn run_generated(
        mut self,
        count: usize,
        discipline: FixedCountDiscipline,
    ) -> Result<RunOutcome> {
        let tasks = self.generator.make_stream(count, 0.0)?;
        self.run_fixed_count(tasks, discipline)
    }

    /// Poisson arrivals during `[0, duration_s)`; in-flight tasks then drain
    ///
    /// The first task arrives at time 0 and each later one an exponential
    /// gap after its predecessor.
    pub fn run_arrivals(mut self, duration_s: f64) -> Result<RunOutcome> {
        if !(duration_s.is_finite() && duration_s > 0.0) {
            return Err(OffloadError::input(format!(
                "duration must be positive, got {duration_s}"
            )));
        }

        info!(
            policy = self.dispatcher.policy().name(),
            duration_s,
            initial_soc = self.battery.soc(),
            "Starting arrival-process run"
        );

        self.feed = Feed::Poisson { until: duration_s };
        self.schedule_poisson_arrival(0.0)?;
        self.run_loop()
    }

    fn run_loop(mut self) -> Result<RunOutcome> {
        let initial_soc = self.battery.soc();

        while let Some((time, event)) = self.events.pop() {
            self.now = time;
            match event {
                Event::TaskArrival { index } => self.on_arrival(index)?,
                Event::Resume { process } => self.on_resume(process)?,
            }
        }

        let stop_reason = if self.depleted {
            StopReason::Depleted
        } else if self.window_closed {
            StopReason::TimeBound
        } else {
            StopReason::Completed
        };

        let outcome = RunOutcome {
            policy_name: self.dispatcher.policy().name().to_string(),
            initial_soc,
            final_soc: self.battery.soc(),
            final_time: self.now,
            dispatched: self.dispatched,
            skipped: self.skipped,
            stop_reason,
            station_stats: self.stations.stats(self.now),
            dispatch_stats: self.dispatcher.stats().clone(),
            cloud_threshold: self.dispatcher.policy().cloud_threshold(),
            records: self.metrics.records().to_vec(),
        };

        info!(
            policy = %outcome.policy_name,
            completed = outcome.records.len(),
            skipped = outcome.skipped,
            final_soc = outcome.final_soc,
            final_time = outcome.final_time,
            stop_reason = %outcome.stop_reason,
            "Run finished"
        );

        Ok(outcome)
    }

    fn arrival_time(&self, index: usize) -> f64 {
        self.pending[index]
            .as_ref()
            .map_or(self.now, |task| task.created_at().max(self.now))
    }

    fn on_arrival(&mut self, index: usize) -> Result<()> {
        let task = self.pending.get_mut(index).and_then(Option::take).ok_or_else(|| {
            OffloadError::input(format!("no pending task at index {index}"))
        })?;

        if self.battery.is_depleted(self.depletion_threshold_soc) {
            self.refuse(index);
            return Ok(());
        }

        let id = self.processes.len();
        self.processes.push(Some(TaskProcess::new(task, self.now)));
        self.dispatched += 1;
        self.on_resume(id)?;

        if let Feed::Poisson { .. } = self.feed {
            let next = self.now + self.generator.next_inter_arrival();
            self.schedule_poisson_arrival(next)?;
        }
        Ok(())
    }

    fn refuse(&mut self, index: usize) {
        if !self.depleted {
            warn!(
                soc = self.battery.soc(),
                threshold = self.depletion_threshold_soc,
                time = self.now,
                "Battery depleted, no further dispatches"
            );
            self.depleted = true;
        }

        match self.feed {
            Feed::Open | Feed::Poisson { .. } => self.skipped += 1,
            Feed::ClosedLoop { .. } => {
                // Nothing else will arrive; the rest of the list is refused too
                self.skipped += self.pending.len() - index;
                self.pending.iter_mut().for_each(|slot| *slot = None);
            }
        }
    }

    fn on_resume(&mut self, id: usize) -> Result<()> {
        let mut process = self
            .processes
            .get_mut(id)
            .and_then(Option::take)
            .ok_or_else(|| OffloadError::input(format!("no live process {id}")))?;

        match self
            .dispatcher
            .resume(&mut process, self.now, &mut self.battery, &mut self.stations)?
        {
            Suspend::Until(wake_at) => {
                debug!(
                    task_id = process.task().id(),
                    phase = ?process.phase(),
                    wake_at,
                    "Task suspended"
                );
                self.processes[id] = Some(process);
                self.events.schedule(wake_at, Event::Resume { process: id });
            }
            Suspend::Finished(record) => {
                self.metrics.record(record);
                if let Feed::ClosedLoop { next } = self.feed {
                    if next < self.pending.len() {
                        self.feed = Feed::ClosedLoop { next: next + 1 };
                        let at = self.arrival_time(next);
                        self.events.schedule(at, Event::TaskArrival { index: next });
                    }
                }
            }
        }
        Ok(())
    }

    fn schedule_poisson_arrival(&mut self, at: f64) -> Result<()> {
        let Feed::Poisson { until } = self.feed else {
            return Ok(());
        };
        if self.depleted {
            return Ok(());
        }

        if at >= until {
            debug!(until, "Arrival window closed");
            self.window_closed = true;
            return Ok(());
        }

        let task = self.generator.generate_task(at)?;
        let index = self.pending.len();
        self.pending.push(Some(task));
        self.events.schedule(at, Event::TaskArrival { index });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::PowerProfile;
    use crate::network::NetworkLink;
    use crate::policy::{BatteryThresholdPolicy, FixedSitePolicy};
    use crate::station::ResourceStation;
    use crate::workload::WorkloadConfig;
    use offload_core::{Site, TaskType};

    fn simulation(policy: Box<dyn DispatchPolicy>, capacity_wh: f64, soc: f64) -> Simulation {
        let stations = Stations {
            local: ResourceStation::new(Site::Local, 1_000_000.0, 1).unwrap(),
            edge: ResourceStation::new(Site::Edge, 5_000_000.0, 1).unwrap(),
            cloud: ResourceStation::new(Site::Cloud, 20_000_000.0, 1).unwrap(),
        };
        let dispatcher = Dispatcher::new(
            policy,
            NetworkLink::new(20.0, 50.0, 20.0, 0.0).unwrap(),
            NetworkLink::new(10.0, 20.0, 80.0, 0.0).unwrap(),
            PowerProfile::default(),
            0.1,
        )
        .unwrap();
        Simulation::from_parts(
            BatteryAccount::new(capacity_wh, soc).unwrap(),
            stations,
            dispatcher,
            TaskGenerator::new(WorkloadConfig::default(), 1).unwrap(),
            0.1,
        )
        .unwrap()
    }

    fn nav(id: u64, ops: f64, at: f64) -> Task {
        Task::new(id, TaskType::Nav, 100, ops, at).unwrap()
    }

    #[test]
    fn test_open_tasks_queue_fifo() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        let tasks = vec![nav(0, 2_000_000.0, 0.0), nav(1, 1_000_000.0, 0.0), nav(2, 500_000.0, 0.5)];

        let outcome = sim.run_fixed_count(tasks, FixedCountDiscipline::Open).unwrap();
        let finish: Vec<f64> = outcome.records.iter().map(|r| r.finish_time).collect();
        let ids: Vec<u64> = outcome.records.iter().map(|r| r.task_id).collect();

        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(finish, vec![2.0, 3.0, 3.5]);
        assert!((outcome.records[1].queue_wait_ms - 2000.0).abs() < 1e-9);
        assert!((outcome.records[2].queue_wait_ms - 2500.0).abs() < 1e-9);
        assert_eq!(outcome.stop_reason, StopReason::Completed);
        assert_eq!(outcome.final_time, 3.5);
        assert_eq!(outcome.dispatched, 3);
    }

    #[test]
    fn test_closed_loop_is_sequential() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        let tasks = vec![nav(0, 2_000_000.0, 0.0), nav(1, 1_000_000.0, 0.0), nav(2, 500_000.0, 0.5)];

        let outcome = sim.run_fixed_count(tasks, FixedCountDiscipline::ClosedLoop).unwrap();
        for record in &outcome.records {
            assert_eq!(record.queue_wait_ms, 0.0);
        }
        assert_eq!(outcome.records[1].dispatch_time, 2.0);
        assert_eq!(outcome.final_time, 3.5);
    }

    #[test]
    fn test_remote_and_local_interleave() {
        let sim = simulation(Box::new(FixedSitePolicy::new(Site::Cloud)), 100.0, 80.0);
        let generic = Task::new(0, TaskType::Generic, 1_000_000, 1_000_000.0, 0.0).unwrap();
        let local = nav(1, 100_000.0, 0.0);

        let outcome = sim
            .run_fixed_count(vec![generic, local], FixedCountDiscipline::Open)
            .unwrap();

        // The short local task finishes while the cloud task is still uploading
        assert_eq!(outcome.records[0].task_id, 1);
        assert_eq!(outcome.records[1].execution_site, Site::Cloud);
        assert!(outcome.validate_hard_rules().passed());
    }

    #[test]
    fn test_depletion_stops_new_dispatches() {
        // 0.002 Wh battery: each 2 s local task draws ~0.0011 Wh
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 0.002, 100.0);
        let tasks: Vec<Task> = (0..10).map(|i| nav(i, 2_000_000.0, 0.0)).collect();

        let outcome = sim.run_fixed_count(tasks, FixedCountDiscipline::ClosedLoop).unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Depleted);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 8);
        assert_eq!(outcome.final_soc, 0.0);
        assert!(outcome.validate_hard_rules().passed());
    }

    #[test]
    fn test_arrival_process_drains_in_flight() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        let outcome = sim.run_arrivals(5.0).unwrap();

        assert_eq!(outcome.stop_reason, StopReason::TimeBound);
        assert_eq!(outcome.records.len(), outcome.dispatched);
        assert!(outcome.records.iter().all(|r| r.dispatch_time < 5.0));
        assert!(outcome.final_time >= outcome.records.iter().map(|r| r.dispatch_time).fold(0.0, f64::max));
        assert!(outcome.validate_hard_rules().passed());
    }

    #[test]
    fn test_first_arrival_at_time_zero() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        let outcome = sim.run_arrivals(1e-9).unwrap();

        // Window shorter than any plausible gap: only the opening task gets in
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(outcome.records[0].dispatch_time, 0.0);
        assert_eq!(outcome.stop_reason, StopReason::TimeBound);
    }

    #[test]
    fn test_invalid_duration() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        assert!(sim.run_arrivals(0.0).is_err());
    }

    #[test]
    fn test_empty_run() {
        let sim = simulation(Box::new(BatteryThresholdPolicy::new()), 100.0, 80.0);
        let outcome = sim.run_fixed_count(Vec::new(), FixedCountDiscipline::ClosedLoop).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.final_soc, 80.0);
        assert_eq!(outcome.stop_reason, StopReason::Completed);
    }
}
