/// ADC acquisition on top of the PMIC register interface
pub mod acquisition;
pub mod average;

pub use acquisition::{AdcCompletion, AdcEngine, Calibration};
pub use average::RunningAverage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BatteryError, Result};

// ADC constants
pub const ADC_RESOLUTION_BITS: u32 = 12;
pub const ADC_MAX_CODE: u16 = 0xFFF; // full scale, also what an open VF pin reads
pub const ADC_CHANNEL_COUNT: usize = 6;

// General-purpose registers written by the bootloader with calibration readings
pub const GPID3_REG: u8 = 0x7A; // voltage LSB
pub const GPID4_REG: u8 = 0x7B; // voltage MSB (low nibble)
pub const GPID5_REG: u8 = 0x7C; // temperature MSB (low nibble)
pub const GPID6_REG: u8 = 0x7D; // temperature LSB

/// Physical ADC inputs of the PMIC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdcChannel {
    Voltage,
    Temperature1,
    Temperature2,
    Vf,
    Ain,
    Tjunc,
}

impl AdcChannel {
    pub const ALL: [AdcChannel; ADC_CHANNEL_COUNT] = [
        AdcChannel::Voltage,
        AdcChannel::Temperature1,
        AdcChannel::Temperature2,
        AdcChannel::Vf,
        AdcChannel::Ain,
        AdcChannel::Tjunc,
    ];

    pub fn index(self) -> usize {
        match self {
            AdcChannel::Voltage => 0,
            AdcChannel::Temperature1 => 1,
            AdcChannel::Temperature2 => 2,
            AdcChannel::Vf => 3,
            AdcChannel::Ain => 4,
            AdcChannel::Tjunc => 5,
        }
    }
}

/// How conversions are triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcMode {
    /// Free-running hardware averaging, one register read per sample
    #[default]
    Auto,
    /// Explicit mux select and start bit, completion signalled by interrupt
    Manual,
}

impl FromStr for AdcMode {
    type Err = BatteryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AdcMode::Auto),
            "manual" => Ok(AdcMode::Manual),
            other => Err(BatteryError::InvalidArgument(format!(
                "unknown ADC mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AdcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdcMode::Auto => write!(f, "auto"),
            AdcMode::Manual => write!(f, "manual"),
        }
    }
}

/// Register-level access to the power-management IC
///
/// Implementations wrap whatever transport the platform uses. In manual mode
/// the implementation reports finished conversions through the
/// [`AdcCompletion`] handed to [`bind_completion`](Pmic::bind_completion),
/// typically from its end-of-conversion interrupt.
pub trait Pmic: Send + Sync {
    fn read_register(&self, addr: u8) -> Result<u8>;

    fn write_register(&self, addr: u8, value: u8) -> Result<()>;

    /// Select `channel` and start a conversion in the given mode
    fn arm_adc_channel(&self, channel: AdcChannel, mode: AdcMode) -> Result<()>;

    /// Latest auto-mode result for `channel` and whether the conversion finished
    fn poll_adc_result(&self, channel: AdcChannel) -> Result<(u16, bool)>;

    /// Disable the channel again after an auto-mode read
    fn release_adc(&self, _channel: AdcChannel) -> Result<()> {
        Ok(())
    }

    /// Wire the end-of-conversion signal to the waiting reader
    fn bind_completion(&self, _completion: Arc<AdcCompletion>) {}
}
