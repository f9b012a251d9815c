//! Robot-side energy model
//!
//! `energy_wh = power_mw / 1000 * seconds / 3600`. Remote compute is paid for
//! by EDGE/CLOUD, so the robot only pays radio time for offloaded work.

use offload_core::{OffloadError, Result};
use serde::{Deserialize, Serialize};

const MW_PER_W: f64 = 1000.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Convert a constant draw over a duration to watt-hours
pub fn mw_seconds_to_wh(power_mw: f64, seconds: f64) -> f64 {
    power_mw / MW_PER_W * seconds / SECONDS_PER_HOUR
}

/// Size of the result sent back for a request of `size_bytes`, at least 1 byte
pub fn result_size_bytes(size_bytes: u64, ratio: f64) -> u64 {
    ((size_bytes as f64 * ratio).floor() as u64).max(1)
}

/// Result ratios are fractions of the request size
pub fn ensure_result_ratio(ratio: f64) -> Result<()> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(OffloadError::config(format!(
            "result_size_ratio must be between 0 and 1, got {ratio}"
        )))
    }
}

/// Robot power draw per activity, in milliwatts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerProfile {
    pub active_local_mw: f64,
    pub tx_mw: f64,
    pub rx_mw: f64,
}

impl Default for PowerProfile {
    fn default() -> Self {
        PowerProfile {
            active_local_mw: 2000.0,
            tx_mw: 800.0,
            rx_mw: 400.0,
        }
    }
}

impl PowerProfile {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("active_local_mw", self.active_local_mw),
            ("tx_mw", self.tx_mw),
            ("rx_mw", self.rx_mw),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(OffloadError::config(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Where one task's energy went, in Wh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyBreakdown {
    pub local_computation: f64,
    pub uplink: f64,
    pub downlink: f64,
    pub communication: f64,
    pub total: f64,
}

impl EnergyBreakdown {
    /// On-robot execution: no radio use
    pub fn local(power: &PowerProfile, compute_seconds: f64) -> Result<Self> {
        ensure_duration("compute", compute_seconds)?;
        let local_computation = mw_seconds_to_wh(power.active_local_mw, compute_seconds);
        Ok(EnergyBreakdown {
            local_computation,
            uplink: 0.0,
            downlink: 0.0,
            communication: 0.0,
            total: local_computation,
        })
    }

    /// Offloaded execution: radio time only
    pub fn remote(power: &PowerProfile, uplink_seconds: f64, downlink_seconds: f64) -> Result<Self> {
        ensure_duration("uplink", uplink_seconds)?;
        ensure_duration("downlink", downlink_seconds)?;
        let uplink = mw_seconds_to_wh(power.tx_mw, uplink_seconds);
        let downlink = mw_seconds_to_wh(power.rx_mw, downlink_seconds);
        let communication = uplink + downlink;
        Ok(EnergyBreakdown {
            local_computation: 0.0,
            uplink,
            downlink,
            communication,
            total: communication,
        })
    }
}

fn ensure_duration(what: &str, seconds: f64) -> Result<()> {
    if !(seconds.is_finite() && seconds >= 0.0) {
        return Err(OffloadError::input(format!(
            "{what} time must be non-negative, got {seconds}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        // 2 W for one hour
        assert_eq!(mw_seconds_to_wh(2000.0, 3600.0), 2.0);
        assert_eq!(mw_seconds_to_wh(800.0, 0.0), 0.0);
    }

    #[test]
    fn test_local_breakdown_has_no_communication() {
        let breakdown = EnergyBreakdown::local(&PowerProfile::default(), 1000.0).unwrap();
        assert_eq!(breakdown.communication, 0.0);
        assert_eq!(breakdown.uplink, 0.0);
        assert_eq!(breakdown.downlink, 0.0);
        assert!((breakdown.local_computation - 2000.0 / 1000.0 * 1000.0 / 3600.0).abs() < 1e-12);
        assert_eq!(breakdown.total, breakdown.local_computation);
    }

    #[test]
    fn test_remote_breakdown_has_no_local_computation() {
        let breakdown = EnergyBreakdown::remote(&PowerProfile::default(), 4.204304, 0.027).unwrap();
        assert_eq!(breakdown.local_computation, 0.0);
        assert!(breakdown.communication > 0.0);
        assert!((breakdown.uplink - 0.8 * 4.204304 / 3600.0).abs() < 1e-12);
        assert!((breakdown.downlink - 0.4 * 0.027 / 3600.0).abs() < 1e-12);
        assert_eq!(breakdown.total, breakdown.uplink + breakdown.downlink);
    }

    #[test]
    fn test_negative_durations_rejected() {
        let power = PowerProfile::default();
        assert!(EnergyBreakdown::local(&power, -1.0).unwrap_err().is_input());
        assert!(EnergyBreakdown::remote(&power, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_result_size() {
        assert_eq!(result_size_bytes(10 * 1024 * 1024, 0.1), 1_048_576);
        assert_eq!(result_size_bytes(5, 0.1), 1);
        assert_eq!(result_size_bytes(1, 0.0), 1);
    }

    #[test]
    fn test_result_ratio_bounds() {
        assert!(ensure_result_ratio(0.0).is_ok());
        assert!(ensure_result_ratio(1.0).is_ok());
        assert!(ensure_result_ratio(1.01).unwrap_err().is_config());
        assert!(ensure_result_ratio(-0.1).unwrap_err().is_config());
        assert!(ensure_result_ratio(f64::NAN).is_err());
    }

    #[test]
    fn test_power_profile_validation() {
        assert!(PowerProfile::default().validate().is_ok());
        let bad = PowerProfile {
            tx_mw: -1.0,
            ..PowerProfile::default()
        };
        assert!(bad.validate().unwrap_err().is_config());
    }
}
