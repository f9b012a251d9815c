//! Network link model between the robot and EDGE/CLOUD
//!
//! A link is pure arithmetic over its bandwidths and latency terms, so any
//! number of in-flight tasks can query it without coordination.
//!
//! ```text
//! pure     = bytes * 8 / (bandwidth_mbps * 1e6)
//! overhead = rtt_ms / 2 / 1000 + jitter_ms / 1000
//! total    = pure + overhead
//! ```

use offload_core::{OffloadError, Result};
use serde::{Deserialize, Serialize};

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Timing breakdown of one transfer, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmissionResult {
    /// Serialization time at link bandwidth
    pub pure_time: f64,
    /// Half RTT plus jitter
    pub overhead: f64,
    pub total: f64,
}

/// Robot <-> remote tier link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLink {
    bw_up_mbps: f64,
    bw_down_mbps: f64,
    rtt_ms: f64,
    jitter_ms: f64,
}

impl NetworkLink {
    /// Create a link, rejecting non-positive bandwidth and negative latency terms
    pub fn new(bw_up_mbps: f64, bw_down_mbps: f64, rtt_ms: f64, jitter_ms: f64) -> Result<Self> {
        if !(bw_up_mbps.is_finite() && bw_up_mbps > 0.0) {
            return Err(OffloadError::config(format!(
                "uplink bandwidth must be positive, got {bw_up_mbps}"
            )));
        }
        if !(bw_down_mbps.is_finite() && bw_down_mbps > 0.0) {
            return Err(OffloadError::config(format!(
                "downlink bandwidth must be positive, got {bw_down_mbps}"
            )));
        }
        if !(rtt_ms.is_finite() && rtt_ms >= 0.0) {
            return Err(OffloadError::config(format!("RTT cannot be negative, got {rtt_ms}")));
        }
        if !(jitter_ms.is_finite() && jitter_ms >= 0.0) {
            return Err(OffloadError::config(format!(
                "jitter cannot be negative, got {jitter_ms}"
            )));
        }

        Ok(NetworkLink {
            bw_up_mbps,
            bw_down_mbps,
            rtt_ms,
            jitter_ms,
        })
    }

    pub fn bw_up_mbps(&self) -> f64 {
        self.bw_up_mbps
    }

    pub fn bw_down_mbps(&self) -> f64 {
        self.bw_down_mbps
    }

    pub fn rtt_ms(&self) -> f64 {
        self.rtt_ms
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    /// Fixed per-transfer latency in seconds (half RTT + jitter)
    pub fn overhead(&self) -> f64 {
        self.rtt_ms / 2.0 / 1000.0 + self.jitter_ms / 1000.0
    }

    /// Time to send `bytes` from the robot
    pub fn uplink_time(&self, bytes: u64) -> TransmissionResult {
        self.transfer(bytes, self.bw_up_mbps)
    }

    /// Time to receive `bytes` on the robot
    pub fn downlink_time(&self, bytes: u64) -> TransmissionResult {
        self.transfer(bytes, self.bw_down_mbps)
    }

    /// Transfer time in the given direction
    pub fn transfer_time(&self, bytes: u64, direction: Direction) -> TransmissionResult {
        match direction {
            Direction::Up => self.uplink_time(bytes),
            Direction::Down => self.downlink_time(bytes),
        }
    }

    /// `(uplink_total, downlink_total, sum)` for a request/response pair
    pub fn round_trip(&self, up_bytes: u64, down_bytes: u64) -> (f64, f64, f64) {
        let up = self.uplink_time(up_bytes).total;
        let down = self.downlink_time(down_bytes).total;
        (up, down, up + down)
    }

    /// Goodput including latency overhead, in Mbps
    pub fn effective_bandwidth_mbps(&self, bytes: u64, direction: Direction) -> f64 {
        let total = self.transfer_time(bytes, direction).total;
        if total <= 0.0 {
            return match direction {
                Direction::Up => self.bw_up_mbps,
                Direction::Down => self.bw_down_mbps,
            };
        }
        (bytes as f64 * BITS_PER_BYTE / BITS_PER_MEGABIT) / total
    }

    /// Bytes in flight over one RTT at the mean of both bandwidths
    pub fn bandwidth_delay_product_bytes(&self) -> f64 {
        let avg_bytes_per_sec =
            (self.bw_up_mbps + self.bw_down_mbps) / 2.0 * BITS_PER_MEGABIT / BITS_PER_BYTE;
        avg_bytes_per_sec * self.rtt_ms / 1000.0
    }

    fn transfer(&self, bytes: u64, bandwidth_mbps: f64) -> TransmissionResult {
        let pure_time = bytes as f64 * BITS_PER_BYTE / (bandwidth_mbps * BITS_PER_MEGABIT);
        let overhead = self.overhead();
        TransmissionResult {
            pure_time,
            overhead,
            total: pure_time + overhead,
        }
    }
}

impl std::fmt::Display for NetworkLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NetworkLink(up={}Mbps, down={}Mbps, rtt={}ms, jitter={}ms)",
            self.bw_up_mbps, self.bw_down_mbps, self.rtt_ms, self.jitter_ms
        )
    }
}
