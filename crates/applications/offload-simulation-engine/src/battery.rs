//! Robot battery ledger
//!
//! The account is owned by the run context and mutated through `&mut self`,
//! so every consume/set_soc call is serialized by the borrow checker.

use std::collections::BTreeMap;

use offload_core::{ensure_soc, OffloadError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One debit against the battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    /// Simulated time (s) of the debit
    pub timestamp: f64,
    /// Requested energy, before clamping at empty
    pub energy_wh: f64,
    pub purpose: String,
    pub task_id: Option<u64>,
}

/// Energy ledger for a fixed-capacity battery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryAccount {
    capacity_wh: f64,
    initial_soc: f64,
    current_energy_wh: f64,
    last_timestamp: f64,
    total_consumed_wh: f64,
    total_requested_wh: f64,
    history: Vec<ConsumptionEntry>,
}

impl BatteryAccount {
    /// Create a battery at `initial_soc` percent of `capacity_wh`
    pub fn new(capacity_wh: f64, initial_soc: f64) -> Result<Self> {
        if !(capacity_wh.is_finite() && capacity_wh > 0.0) {
            return Err(OffloadError::config(format!(
                "battery capacity must be positive, got {capacity_wh}"
            )));
        }
        ensure_soc(initial_soc)?;

        Ok(BatteryAccount {
            capacity_wh,
            initial_soc,
            current_energy_wh: capacity_wh * initial_soc / 100.0,
            last_timestamp: 0.0,
            total_consumed_wh: 0.0,
            total_requested_wh: 0.0,
            history: Vec::new(),
        })
    }

    pub fn capacity_wh(&self) -> f64 {
        self.capacity_wh
    }

    pub fn initial_soc(&self) -> f64 {
        self.initial_soc
    }

    /// State of charge in percent
    pub fn soc(&self) -> f64 {
        (self.current_energy_wh * 100.0 / self.capacity_wh).clamp(0.0, 100.0)
    }

    pub fn remaining_energy_wh(&self) -> f64 {
        self.current_energy_wh
    }

    /// Overwrite the charge level. History is kept.
    pub fn set_soc(&mut self, soc: f64) -> Result<()> {
        ensure_soc(soc)?;
        self.current_energy_wh = self.capacity_wh * soc / 100.0;
        debug!(soc, "Battery SoC set");
        Ok(())
    }

    /// Start over at `soc` with an empty history
    pub fn reset(&mut self, soc: f64) -> Result<()> {
        ensure_soc(soc)?;
        self.initial_soc = soc;
        self.current_energy_wh = self.capacity_wh * soc / 100.0;
        self.last_timestamp = 0.0;
        self.total_consumed_wh = 0.0;
        self.total_requested_wh = 0.0;
        self.history.clear();
        Ok(())
    }

    /// Debit `energy_wh` at the most recently recorded timestamp
    pub fn consume(&mut self, energy_wh: f64, purpose: &str, task_id: Option<u64>) -> Result<()> {
        self.consume_at(self.last_timestamp, energy_wh, purpose, task_id)
    }

    /// Debit `energy_wh` at simulated time `timestamp`.
    ///
    /// Stored energy is clamped at zero; the history entry keeps the
    /// requested amount.
    pub fn consume_at(
        &mut self,
        timestamp: f64,
        energy_wh: f64,
        purpose: &str,
        task_id: Option<u64>,
    ) -> Result<()> {
        if !(energy_wh.is_finite() && energy_wh >= 0.0) {
            return Err(OffloadError::input(format!(
                "energy must be non-negative, got {energy_wh}"
            )));
        }
        if !(timestamp.is_finite() && timestamp >= 0.0) {
            return Err(OffloadError::input(format!(
                "timestamp must be finite and non-negative, got {timestamp}"
            )));
        }

        let drawn = energy_wh.min(self.current_energy_wh);
        self.current_energy_wh -= drawn;
        self.total_consumed_wh += drawn;
        self.total_requested_wh += energy_wh;
        self.last_timestamp = self.last_timestamp.max(timestamp);

        self.history.push(ConsumptionEntry {
            timestamp,
            energy_wh,
            purpose: purpose.to_string(),
            task_id,
        });

        if drawn < energy_wh {
            warn!(
                purpose,
                requested_wh = energy_wh,
                drawn_wh = drawn,
                "Battery exhausted, debit clamped"
            );
        }

        Ok(())
    }

    /// True once SoC has fallen to `threshold_soc` or below
    pub fn is_depleted(&self, threshold_soc: f64) -> bool {
        self.soc() <= threshold_soc
    }

    pub fn history(&self) -> &[ConsumptionEntry] {
        &self.history
    }

    /// Energy actually drawn, after clamping
    pub fn total_consumed_wh(&self) -> f64 {
        self.total_consumed_wh
    }

    /// Energy requested across all debits
    pub fn total_requested_wh(&self) -> f64 {
        self.total_requested_wh
    }

    /// Requested energy summed per purpose string
    pub fn consumption_by_purpose(&self) -> BTreeMap<String, f64> {
        let mut by_purpose = BTreeMap::new();
        for entry in &self.history {
            *by_purpose.entry(entry.purpose.clone()).or_insert(0.0) += entry.energy_wh;
        }
        by_purpose
    }
}

impl std::fmt::Display for BatteryAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BatteryAccount(capacity={}Wh, soc={:.2}%, consumed={:.6}Wh)",
            self.capacity_wh,
            self.soc(),
            self.total_consumed_wh
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let battery = BatteryAccount::new(100.0, 80.0).unwrap();
        assert_eq!(battery.soc(), 80.0);
        assert_eq!(battery.remaining_energy_wh(), 80.0);
        assert!(battery.history().is_empty());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(BatteryAccount::new(0.0, 50.0).unwrap_err().is_config());
        assert!(BatteryAccount::new(-5.0, 50.0).unwrap_err().is_config());
        assert!(BatteryAccount::new(100.0, 101.0).unwrap_err().is_input());
        assert!(BatteryAccount::new(100.0, -0.1).unwrap_err().is_input());
        assert!(BatteryAccount::new(100.0, f64::NAN).unwrap_err().is_input());
    }

    #[test]
    fn test_consume_reduces_soc() {
        let mut battery = BatteryAccount::new(100.0, 50.0).unwrap();
        battery.consume(10.0, "task_1_local", Some(1)).unwrap();
        assert_eq!(battery.soc(), 40.0);
        assert_eq!(battery.history().len(), 1);
        assert_eq!(battery.history()[0].purpose, "task_1_local");
        assert_eq!(battery.history()[0].task_id, Some(1));
    }

    #[test]
    fn test_consume_rejects_bad_energy() {
        let mut battery = BatteryAccount::new(100.0, 50.0).unwrap();
        assert!(battery.consume(-1.0, "x", None).unwrap_err().is_input());
        assert!(battery.consume(f64::NAN, "x", None).unwrap_err().is_input());
        assert!(battery.consume(f64::INFINITY, "x", None).unwrap_err().is_input());
        assert!(battery.history().is_empty());
        assert_eq!(battery.soc(), 50.0);
    }

    #[test]
    fn test_zero_consumption_recorded() {
        let mut battery = BatteryAccount::new(10.0, 50.0).unwrap();
        battery.consume(0.0, "idle", None).unwrap();
        assert_eq!(battery.soc(), 50.0);
        assert_eq!(battery.history().len(), 1);
    }

    #[test]
    fn test_clamped_at_empty() {
        let mut battery = BatteryAccount::new(10.0, 10.0).unwrap();
        battery.consume_at(2.5, 5.0, "big", Some(7)).unwrap();

        assert_eq!(battery.soc(), 0.0);
        assert_eq!(battery.total_consumed_wh(), 1.0);
        assert_eq!(battery.total_requested_wh(), 5.0);
        assert_eq!(battery.history()[0].energy_wh, 5.0);
        assert_eq!(battery.history()[0].timestamp, 2.5);
        assert!(battery.is_depleted(0.1));
    }

    #[test]
    fn test_soc_monotonic_over_sequence() {
        let mut battery = BatteryAccount::new(5.0, 100.0).unwrap();
        let mut previous = battery.soc();
        for i in 0..200 {
            let energy = 0.001 * (i % 7) as f64 + 0.0005 * (i % 3) as f64;
            battery.consume(energy, "step", Some(i)).unwrap();
            let soc = battery.soc();
            assert!((0.0..=100.0).contains(&soc));
            assert!(soc <= previous);
            previous = soc;
        }
    }

    #[test]
    fn test_consume_reuses_last_timestamp() {
        let mut battery = BatteryAccount::new(10.0, 100.0).unwrap();
        battery.consume_at(4.0, 0.1, "a", None).unwrap();
        battery.consume(0.1, "b", None).unwrap();
        assert_eq!(battery.history()[1].timestamp, 4.0);
    }

    #[test]
    fn test_set_soc_and_reset() {
        let mut battery = BatteryAccount::new(100.0, 80.0).unwrap();
        battery.consume(10.0, "a", None).unwrap();

        battery.set_soc(95.0).unwrap();
        assert_eq!(battery.soc(), 95.0);
        assert_eq!(battery.history().len(), 1);
        assert!(battery.set_soc(120.0).unwrap_err().is_input());

        battery.reset(60.0).unwrap();
        assert_eq!(battery.soc(), 60.0);
        assert_eq!(battery.initial_soc(), 60.0);
        assert!(battery.history().is_empty());
        assert_eq!(battery.total_consumed_wh(), 0.0);
        assert!(battery.reset(-1.0).is_err());
    }

    #[test]
    fn test_consumption_by_purpose() {
        let mut battery = BatteryAccount::new(100.0, 100.0).unwrap();
        battery.consume(1.0, "task_1_edge", Some(1)).unwrap();
        battery.consume(2.0, "task_2_local", Some(2)).unwrap();
        battery.consume(0.5, "task_1_edge", Some(1)).unwrap();

        let by_purpose = battery.consumption_by_purpose();
        assert_eq!(by_purpose.len(), 2);
        assert_eq!(by_purpose["task_1_edge"], 1.5);
        assert_eq!(by_purpose["task_2_local"], 2.0);
    }
}
