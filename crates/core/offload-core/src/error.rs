//! Error types for the offloading simulator

use thiserror::Error;

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, OffloadError>;

/// Errors raised by the simulation core.
///
/// Both variants are fatal: the simulator is closed and deterministic, so a bad
/// value is a caller bug and the run is aborted rather than retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OffloadError {
    /// Rejected at construction time (rates, bandwidths, capacities, ratios)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected at call time (SoC range, negative energy, bad task fields)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OffloadError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an input error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for [`OffloadError::InvalidConfig`]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// True for [`OffloadError::InvalidInput`]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Fail with `InvalidInput` unless `soc` lies in `[0, 100]`.
pub fn ensure_soc(soc: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&soc) {
        return Err(OffloadError::input(format!(
            "SoC must be between 0-100%, got {soc}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OffloadError::config("service rate must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: service rate must be positive"
        );
        assert!(err.is_config());
        assert!(!err.is_input());
    }

    #[test]
    fn test_ensure_soc_bounds() {
        assert!(ensure_soc(0.0).is_ok());
        assert!(ensure_soc(100.0).is_ok());
        assert!(ensure_soc(-0.01).unwrap_err().is_input());
        assert!(ensure_soc(100.01).unwrap_err().is_input());
        assert!(ensure_soc(f64::NAN).is_err());
    }
}
