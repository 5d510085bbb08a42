/// Error types shared by the acquisition, estimator and charge-control layers
use thiserror::Error;

/// Failures surfaced by the battery monitor.
///
/// None of these are fatal: every caller degrades to the last known good value
/// and retries on the next monitor cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatteryError {
    /// ADC conversion or register access did not complete within its retry budget
    #[error("I/O timeout: {0}")]
    IoTimeout(String),
    /// Malformed channel or parameter, rejected before any state was touched
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Platform calibration data violates an ordering invariant
    #[error("calibration inconsistent: {0}")]
    CalibrationInconsistent(String),
    /// VF channel reads the maximum code, so no battery is fitted
    #[error("battery absent (VF ADC {0:#05x})")]
    BatteryAbsent(u16),
}

pub type Result<T> = std::result::Result<T, BatteryError>;
