//! FIFO resource stations for the LOCAL, EDGE and CLOUD tiers
//!
//! A station has `capacity` identical servers. Arrivals are admitted in the
//! order they are presented and each one takes the server that frees up
//! first, so for `capacity = 1`:
//!
//! ```text
//! finish[i] = max(arrival[i], finish[i-1]) + service[i]
//! ```
//!
//! Because start times are fixed at admission, the simulator only needs to
//! schedule two wake-ups per task (slot acquired, service done) instead of
//! polling the queue.

use std::collections::VecDeque;

use offload_core::{OffloadError, Result, Site, Task};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timing of one task through a station, in simulated seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub task_id: u64,
    pub arrival_time: f64,
    pub start_time: f64,
    pub service_time: f64,
    pub finish_time: f64,
    pub queue_wait: f64,
}

impl ProcessingRecord {
    /// Queue wait plus service
    pub fn total_time(&self) -> f64 {
        self.queue_wait + self.service_time
    }

    /// True when the task had to wait for a server
    pub fn was_queued(&self) -> bool {
        self.queue_wait > 0.0
    }
}

/// Observational counters, never fed back into scheduling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationStats {
    pub site: Option<Site>,
    pub total_tasks: usize,
    pub total_service_time: f64,
    pub total_queue_time: f64,
    pub utilization: f64,
    pub avg_service_time: f64,
    pub avg_queue_time: f64,
    pub current_queue_length: usize,
    pub max_queue_length: usize,
}

/// Bounded FIFO service queue
#[derive(Debug, Clone)]
pub struct ResourceStation {
    site: Site,
    service_rate: f64,
    capacity: usize,

    // Per-server time at which it becomes free
    slot_free_at: Vec<f64>,
    last_arrival: f64,
    // Start times of admitted tasks still waiting; non-decreasing under FIFO
    pending_starts: VecDeque<f64>,

    history: Vec<ProcessingRecord>,
    total_service_time: f64,
    total_queue_time: f64,
    max_queue_length: usize,
}

impl ResourceStation {
    /// Create a station
    ///
    /// # Arguments
    /// * `service_rate` - Operations per second, must be > 0
    /// * `capacity` - Number of parallel servers, must be >= 1
    pub fn new(site: Site, service_rate: f64, capacity: usize) -> Result<Self> {
        if !(service_rate.is_finite() && service_rate > 0.0) {
            return Err(OffloadError::config(format!(
                "{site}: service rate must be positive, got {service_rate}"
            )));
        }
        if capacity < 1 {
            return Err(OffloadError::config(format!(
                "{site}: capacity must be at least 1, got {capacity}"
            )));
        }

        Ok(ResourceStation {
            site,
            service_rate,
            capacity,
            slot_free_at: vec![0.0; capacity],
            last_arrival: 0.0,
            pending_starts: VecDeque::new(),
            history: Vec::new(),
            total_service_time: 0.0,
            total_queue_time: 0.0,
            max_queue_length: 0,
        })
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn service_rate(&self) -> f64 {
        self.service_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seconds of service needed for `task`
    pub fn service_time(&self, task: &Task) -> f64 {
        task.compute_demand() / self.service_rate
    }

    /// Admit `task` at `arrival_time`, returning `(finish_time, service_time)`.
    pub fn process(&mut self, task: &Task, arrival_time: f64) -> Result<(f64, f64)> {
        let record = self.admit(task, arrival_time)?;
        Ok((record.finish_time, record.service_time))
    }

    /// Admit `task` at `arrival_time` and fix its start and finish times.
    ///
    /// Arrivals must be presented in non-decreasing time order; that is what
    /// makes admission order equal FIFO order.
    pub fn admit(&mut self, task: &Task, arrival_time: f64) -> Result<ProcessingRecord> {
        if !(arrival_time.is_finite() && arrival_time >= 0.0) {
            return Err(OffloadError::input(format!(
                "{}: arrival time must be finite and non-negative, got {arrival_time}",
                self.site
            )));
        }
        if arrival_time < self.last_arrival {
            return Err(OffloadError::input(format!(
                "{}: arrival at {arrival_time} precedes previous arrival at {}",
                self.site, self.last_arrival
            )));
        }
        self.last_arrival = arrival_time;

        // Earliest-free server, lowest index on ties
        let (slot, free_at) = self
            .slot_free_at
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, t)| if t < best.1 { (i, t) } else { best });

        let service_time = self.service_time(task);
        let start_time = arrival_time.max(free_at);
        let finish_time = start_time + service_time;
        let queue_wait = start_time - arrival_time;
        self.slot_free_at[slot] = finish_time;

        while self
            .pending_starts
            .front()
            .is_some_and(|&start| start <= arrival_time)
        {
            self.pending_starts.pop_front();
        }
        if start_time > arrival_time {
            self.pending_starts.push_back(start_time);
            self.max_queue_length = self.max_queue_length.max(self.pending_starts.len());
        }

        let record = ProcessingRecord {
            task_id: task.id(),
            arrival_time,
            start_time,
            service_time,
            finish_time,
            queue_wait,
        };

        self.history.push(record);
        self.total_service_time += service_time;
        self.total_queue_time += queue_wait;

        debug!(
            site = %self.site,
            task_id = task.id(),
            slot,
            queue_wait,
            finish_time,
            "Task admitted"
        );

        Ok(record)
    }

    /// Number of admitted tasks still waiting for a server at `now`
    pub fn queue_length_at(&self, now: f64) -> usize {
        self.pending_starts.iter().filter(|&&start| start > now).count()
    }

    /// Number of servers busy at `now`
    pub fn busy_slots_at(&self, now: f64) -> usize {
        self.history
            .iter()
            .filter(|r| r.start_time <= now && now < r.finish_time)
            .count()
    }

    pub fn history(&self) -> &[ProcessingRecord] {
        &self.history
    }

    /// Utilisation counters as of simulated time `now`
    pub fn stats(&self, now: f64) -> StationStats {
        let total_tasks = self.history.len();
        let utilization = if now > 0.0 {
            (self.total_service_time / (self.capacity as f64 * now)).min(1.0)
        } else {
            0.0
        };
        let (avg_service_time, avg_queue_time) = if total_tasks > 0 {
            (
                self.total_service_time / total_tasks as f64,
                self.total_queue_time / total_tasks as f64,
            )
        } else {
            (0.0, 0.0)
        };

        StationStats {
            site: Some(self.site),
            total_tasks,
            total_service_time: self.total_service_time,
            total_queue_time: self.total_queue_time,
            utilization,
            avg_service_time,
            avg_queue_time,
            current_queue_length: self.queue_length_at(now),
            max_queue_length: self.max_queue_length,
        }
    }

    /// Clear observations; queue state is left untouched
    pub fn reset_stats(&mut self) {
        self.history.clear();
        self.total_service_time = 0.0;
        self.total_queue_time = 0.0;
        self.max_queue_length = self.pending_starts.len();
    }
}

impl std::fmt::Display for ResourceStation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ResourceStation(site={}, service_rate={}, capacity={})",
            self.site, self.service_rate, self.capacity
        )
    }
}

/// The three tier stations of a run
#[derive(Debug, Clone)]
pub struct Stations {
    pub local: ResourceStation,
    pub edge: ResourceStation,
    pub cloud: ResourceStation,
}

impl Stations {
    pub fn get(&self, site: Site) -> &ResourceStation {
        match site {
            Site::Local => &self.local,
            Site::Edge => &self.edge,
            Site::Cloud => &self.cloud,
        }
    }

    pub fn get_mut(&mut self, site: Site) -> &mut ResourceStation {
        match site {
            Site::Local => &mut self.local,
            Site::Edge => &mut self.edge,
            Site::Cloud => &mut self.cloud,
        }
    }

    /// Stats for all three tiers, LOCAL first
    pub fn stats(&self, now: f64) -> Vec<StationStats> {
        Site::ALL.iter().map(|&site| self.get(site).stats(now)).collect()
    }
}
