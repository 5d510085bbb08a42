/// SOC estimation from averaged, temperature-compensated ADC codes
///
/// Voltage samples are corrected for charge current and smoothed against the
/// running average before they enter it; the averaged code is then converted
/// to SOC through the banded lookup tables and passed through [`SocFilter`].
use log::{debug, info};
use std::fmt;
use std::str::FromStr;

use crate::adc::{Calibration, RunningAverage, ADC_RESOLUTION_BITS};
use crate::config::{BatteryConfig, TemperatureBands, TemperatureMapPoint};
use crate::error::BatteryError;
use crate::models::{BatteryHealth, BatteryStatus, EndOfCharge};
use crate::tables::{BatteryProfile, ADC_TO_TEMPERATURE, ADC_TO_VBAT_OFFSET, SOC_POINTS};
use crate::utils::{c2k, interpolate, k2c};

/// Samples per running average, a power of two
pub const AVG_SIZE: usize = 16;

// Smoothing constants
const WEIGHT_SCALE: i32 = 10_000;
const SMALL_DROP_ADC: i32 = 14;
const SMALL_DROP_KEEP_PERCENT: i32 = 95;

// First-sample correction
const BOOT_OFFSET_COLD: i32 = 330;
const BOOT_OFFSET_ROOM: i32 = 110;
const BOOT_CC_LOOKUP_SHIFT: i32 = 200;
const BOOT_CV_INTERCEPT: i32 = 2076;
const BOOT_CV_SLOPE_NUM: i32 = 80;
const BOOT_CV_SLOPE_DEN: i32 = 145;
const BOOT_CAL_TEMPERATURE_WINDOW: i32 = 1000;
const BOOT_CAL_VOLTAGE_WINDOW: i32 = 100;

/// Which SOC conversion the monitor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocAlgorithm {
    /// Blend of the two temperature bands around the battery temperature
    #[default]
    TemperatureCompensated,
    /// Room-temperature table only, with the charging offset removed
    RoomTemperature,
}

impl SocAlgorithm {
    pub fn strategy(
        self,
        profile: &'static BatteryProfile,
        bands: TemperatureBands,
    ) -> Box<dyn SocStrategy> {
        match self {
            SocAlgorithm::TemperatureCompensated => {
                Box::new(TemperatureCompensated { profile, bands })
            }
            SocAlgorithm::RoomTemperature => Box::new(RoomTemperature { profile }),
        }
    }
}

impl FromStr for SocAlgorithm {
    type Err = BatteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "compensated" | "temperature-compensated" => {
                Ok(SocAlgorithm::TemperatureCompensated)
            }
            "room" | "room-temperature" => Ok(SocAlgorithm::RoomTemperature),
            other => Err(BatteryError::InvalidArgument(format!(
                "unknown SOC algorithm '{}'",
                other
            ))),
        }
    }
}

/// Inputs every SOC strategy works from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocInput {
    pub average_voltage_adc: i32,
    /// Tenths of a Kelvin
    pub temperature_k: i32,
    pub is_charging: bool,
}

/// Conversion from averaged voltage ADC to an unclamped SOC percentage
pub trait SocStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate_soc(&self, input: &SocInput) -> i32;
}

pub struct TemperatureCompensated {
    profile: &'static BatteryProfile,
    bands: TemperatureBands,
}

impl SocStrategy for TemperatureCompensated {
    fn name(&self) -> &'static str {
        "temperature-compensated"
    }

    fn estimate_soc(&self, input: &SocInput) -> i32 {
        adc_to_soc_with_temperature(
            self.profile,
            &self.bands,
            input.average_voltage_adc,
            input.temperature_k,
        )
    }
}

pub struct RoomTemperature {
    profile: &'static BatteryProfile,
}

impl SocStrategy for RoomTemperature {
    fn name(&self) -> &'static str {
        "room-temperature"
    }

    fn estimate_soc(&self, input: &SocInput) -> i32 {
        adc_to_soc_room(self.profile, input.average_voltage_adc, input.is_charging)
    }
}

/// Keeps reported SOC monotonic in the direction of current flow
///
/// While discharging the value never rises, while charging it never falls.
/// Moves of up to two points in the permitted direction are taken as-is;
/// larger moves are limited to one point per evaluation. This is the rule of
/// the driver's dedicated filter routine, not of its unfiltered readout path.
#[derive(Debug, Clone, Default)]
pub struct SocFilter {
    previous: Option<i32>,
}

impl SocFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, soc: i32, is_charging: bool) -> i32 {
        let filtered = match self.previous {
            None => soc,
            Some(prev) if soc > prev => {
                if !is_charging {
                    prev
                } else if soc <= prev + 2 {
                    soc
                } else {
                    prev + 1
                }
            }
            Some(prev) if soc < prev => {
                if is_charging {
                    prev
                } else if soc >= prev - 2 {
                    soc
                } else {
                    prev - 1
                }
            }
            Some(prev) => prev,
        };

        self.previous = Some(filtered);
        filtered
    }

    /// Last reported value, if any
    pub fn previous(&self) -> Option<i32> {
        self.previous
    }

    /// Override the carried value, used when the charger reports a full cell
    pub fn force(&mut self, soc: i32) {
        self.previous = Some(soc);
    }
}

/// Progress of the voltage average from power-on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorPhase {
    #[default]
    Uninitialized,
    /// Calibration registers are being read for the first sample
    Bootstrapping,
    SteadyState,
}

/// Everything the estimator and the charge state machine share
#[derive(Debug, Clone)]
pub struct BatteryState {
    pub phase: EstimatorPhase,
    pub voltage_adc: RunningAverage<AVG_SIZE>,
    pub temperature_adc: RunningAverage<AVG_SIZE>,
    /// Last raw voltage code before correction
    pub origin_voltage_adc: i32,
    /// Last corrected voltage code pushed into the average
    pub current_voltage_adc: i32,
    pub current_temperature_adc: i32,
    pub current_voltage_mv: i32,
    pub average_voltage_mv: i32,
    /// Tenths of a degree Celsius
    pub current_temperature: i32,
    /// Tenths of a degree Celsius
    pub average_temperature: i32,
    pub soc: i32,
    pub soc_filter: SocFilter,
    pub vf_adc: i32,
    pub vf_ohm: u32,
    pub present: bool,
    pub health: BatteryHealth,
    pub status: BatteryStatus,
    pub end_of_charge: EndOfCharge,
    /// Steady-state samples taken since the average was seeded
    pub samples_since_bootstrap: usize,
    /// Next discharge sample is replicated through the whole average
    pub ticker: bool,
}

impl Default for BatteryState {
    fn default() -> Self {
        Self {
            phase: EstimatorPhase::Uninitialized,
            voltage_adc: RunningAverage::new(),
            temperature_adc: RunningAverage::new(),
            origin_voltage_adc: 0,
            current_voltage_adc: 0,
            current_temperature_adc: 0,
            current_voltage_mv: 0,
            average_voltage_mv: 0,
            current_temperature: 0,
            average_temperature: 0,
            soc: 0,
            soc_filter: SocFilter::new(),
            vf_adc: 0,
            vf_ohm: 0,
            present: true,
            health: BatteryHealth::Good,
            status: BatteryStatus::Discharging,
            end_of_charge: EndOfCharge::empty(),
            samples_since_bootstrap: 0,
            ticker: false,
        }
    }
}

impl BatteryState {
    pub fn average_voltage_adc(&self) -> i32 {
        self.voltage_adc.average()
    }

    pub fn average_temperature_adc(&self) -> i32 {
        self.temperature_adc.average()
    }

    pub fn voltage_initialized(&self) -> bool {
        self.phase == EstimatorPhase::SteadyState
    }

    pub fn temperature_initialized(&self) -> bool {
        self.temperature_adc.is_initialized()
    }

    /// Fold a temperature code into the average and refresh both temperatures
    pub fn apply_temperature_sample(&mut self, code: i32) {
        self.current_temperature_adc = code;
        self.temperature_adc.push(code);
        self.average_temperature = k2c(adc_to_temperature_k(self.temperature_adc.average()));
        self.current_temperature = k2c(adc_to_temperature_k(code));
    }

    /// Record an averaged VF reading and its resistance
    pub fn apply_vf_sample(&mut self, code: i32) {
        self.vf_adc = code;
        self.vf_ohm = vf_ohm(code);
    }

    /// `((avg_voltage_adc & 0xFFF) << 12) | (avg_temperature_adc & 0xFFF)`
    pub fn raw_adc_composite(&self) -> u32 {
        let volt = (self.average_voltage_adc() as u32) & 0xFFF;
        let temp = (self.average_temperature_adc() as u32) & 0xFFF;
        (volt << 12) | temp
    }
}

/// Result of folding one voltage sample in, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoltageSample {
    pub corrected_adc: i32,
    pub weight: i32,
    pub offset: i32,
    /// The sample seeded the average
    pub bootstrapped: bool,
}

/// Calibrated conversion pipeline for one battery profile
pub struct Estimator {
    profile: &'static BatteryProfile,
    bands: TemperatureBands,
    power_off_voltage_mv: i32,
    cv_adc_level: i32,
    strategy: Box<dyn SocStrategy>,
}

impl Estimator {
    pub fn new(config: &BatteryConfig) -> Self {
        let profile = BatteryProfile::for_capacity(config.capacity_mah);
        let strategy = config.soc_algorithm.strategy(profile, config.bands);
        info!(
            "SOC estimator using {} profile with {} strategy",
            profile.name,
            strategy.name()
        );

        Self {
            profile,
            bands: config.bands,
            power_off_voltage_mv: config.power_off_voltage_mv,
            cv_adc_level: config.cv_adc_level,
            strategy,
        }
    }

    pub fn profile(&self) -> &'static BatteryProfile {
        self.profile
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Correct a raw voltage code and fold it into the running average
    ///
    /// The first sample after power-on seeds the whole average, optionally
    /// blended with the bootloader's calibration reading. Later samples are
    /// smoothed against the current average, differently for charge and
    /// discharge.
    pub fn apply_voltage_sample(
        &self,
        state: &mut BatteryState,
        code: i32,
        is_charging: bool,
        calibration: Calibration,
    ) -> VoltageSample {
        let temperature_k = c2k(state.average_temperature);
        let average = state.voltage_adc.average();
        let mut new = code;
        let mut weight = 0;
        let mut offset = 0;
        let bootstrapped = state.phase != EstimatorPhase::SteadyState;

        if bootstrapped {
            new = self.bootstrap_voltage(
                code,
                temperature_k,
                state.average_temperature_adc(),
                is_charging,
                calibration,
            );
            state.voltage_adc.fill(new);
            state.phase = EstimatorPhase::SteadyState;
            state.samples_since_bootstrap = 0;
            info!("Voltage average seeded with ADC {}", new);
        } else {
            weight = self.weight(temperature_k, average, is_charging);

            if is_charging {
                let target = self.charge_target_offset(temperature_k, average);
                offset = new - average;
                new = if offset > target {
                    // no load, the whole rise is charge current
                    new - target
                } else {
                    average + offset * weight / WEIGHT_SCALE
                };
                state.voltage_adc.push(new);
            } else {
                offset = average - new;
                let offset_old = state.voltage_adc.oldest() - average;
                if offset > 0 {
                    new = if offset <= SMALL_DROP_ADC {
                        new + offset * SMALL_DROP_KEEP_PERCENT / 100
                    } else {
                        average - offset * weight / WEIGHT_SCALE
                            + offset_old * weight / WEIGHT_SCALE
                    };
                }

                let repeats = if state.ticker { AVG_SIZE } else { 1 };
                for _ in 0..repeats {
                    state.voltage_adc.push(new);
                }
            }
            state.ticker = false;
            state.samples_since_bootstrap = state.samples_since_bootstrap.saturating_add(1);
        }

        state.origin_voltage_adc = code;
        state.current_voltage_adc = new;
        state.current_voltage_mv = adc_to_vbat(new, is_charging);
        state.average_voltage_mv = adc_to_vbat(state.voltage_adc.average(), is_charging);

        VoltageSample {
            corrected_adc: new,
            weight,
            offset,
            bootstrapped,
        }
    }

    /// Recompute SOC from the current averages
    pub fn update_soc(&self, state: &mut BatteryState, is_charging: bool) -> i32 {
        let input = SocInput {
            average_voltage_adc: state.voltage_adc.average(),
            temperature_k: c2k(state.average_temperature),
            is_charging,
        };
        let raw = self.strategy.estimate_soc(&input);

        let mut soc = raw.clamp(0, 100);
        if soc == 0 && (state.current_voltage_mv >= self.power_off_voltage_mv || is_charging) {
            soc = 1;
        }

        state.soc = state.soc_filter.apply(soc, is_charging);
        debug!(
            "SOC {}% (table {}), ADC(oV) {}, ADC(aV) {}, {} mV, ADC(T) {}, Temp {}",
            state.soc,
            raw,
            state.origin_voltage_adc,
            input.average_voltage_adc,
            state.average_voltage_mv,
            state.average_temperature_adc(),
            state.average_temperature
        );
        state.soc
    }

    fn bootstrap_voltage(
        &self,
        code: i32,
        temperature_k: i32,
        average_temperature_adc: i32,
        is_charging: bool,
        calibration: Calibration,
    ) -> i32 {
        let mut new = code + self.bootstrap_temperature_offset(temperature_k);

        if is_charging {
            if new > self.cv_adc_level {
                new -= BOOT_CV_INTERCEPT - new * BOOT_CV_SLOPE_NUM / BOOT_CV_SLOPE_DEN;
            } else {
                new -= self.charge_target_offset(temperature_k, new - BOOT_CC_LOOKUP_SHIFT);
            }
        }

        let temperature_close = calibration
            .temperature_adc
            .map_or(true, |t| (t - average_temperature_adc).abs() < BOOT_CAL_TEMPERATURE_WINDOW);
        if let Some(stored) = calibration.voltage_adc {
            if temperature_close && (stored - new).abs() < BOOT_CAL_VOLTAGE_WINDOW {
                new = (stored * 40 + new * 60) / 100;
            }
        }

        new
    }

    /// First-sample offset: large when cold, small from room temperature up
    pub fn bootstrap_temperature_offset(&self, temperature_k: i32) -> i32 {
        interpolate(
            &[self.bands.low_low, self.bands.room],
            &[BOOT_OFFSET_COLD, BOOT_OFFSET_ROOM],
            temperature_k,
        )
    }

    /// Smoothing weight for the band around `temperature_k` at `average_adc`
    pub fn weight(&self, temperature_k: i32, average_adc: i32, is_charging: bool) -> i32 {
        let bands = &self.bands;
        let t = temperature_k.clamp(bands.low_low, bands.high);
        let table = if is_charging {
            &self.profile.charge_weight
        } else {
            &self.profile.discharge_weight
        };

        let breakpoints = if t >= bands.room {
            &self.profile.soc.adc_room
        } else if t >= bands.low {
            &self.profile.soc.adc_low
        } else {
            &self.profile.soc.adc_low_low
        };
        let i = section_index(breakpoints, average_adc);

        if t > bands.room {
            table.room[i]
        } else if t > bands.low {
            table.low[i] + (t - bands.low) * (table.room[i] - table.low[i]) / (bands.room - bands.low)
        } else {
            table.low_low[i]
                + (t - bands.low_low) * (table.low[i] - table.low_low[i])
                    / (bands.low - bands.low_low)
        }
    }

    /// Expected voltage rise caused by charge current, never negative
    pub fn charge_target_offset(&self, temperature_k: i32, average_adc: i32) -> i32 {
        let bands = &self.bands;
        let breakpoints = if temperature_k < bands.low_low {
            &self.profile.soc.adc_low_low
        } else if temperature_k > bands.room {
            &self.profile.soc.adc_room
        } else {
            &self.profile.soc.adc_low
        };
        let offsets = &self.profile.charge_offset;

        let i = section_index(breakpoints, average_adc);
        if i + 1 >= SOC_POINTS {
            return offsets[SOC_POINTS - 1].max(0);
        }

        let diff = offsets[i]
            + (average_adc - breakpoints[i]) * (offsets[i + 1] - offsets[i])
                / (breakpoints[i + 1] - breakpoints[i]);
        diff.max(0)
    }
}

impl fmt::Debug for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Estimator")
            .field("profile", &self.profile.name)
            .field("strategy", &self.strategy.name())
            .field("bands", &self.bands)
            .finish()
    }
}

/// Largest `i` with `breakpoints[i] <= adc`, or 0 below the table
fn section_index(breakpoints: &[i32; SOC_POINTS], adc: i32) -> usize {
    (1..SOC_POINTS)
        .rev()
        .find(|&i| breakpoints[i] <= adc)
        .unwrap_or(0)
}

/// Thermistor code to tenths of a Kelvin
pub fn adc_to_temperature_k(adc: i32) -> i32 {
    ADC_TO_TEMPERATURE.lookup_descending(adc)
}

/// ADC offset the charger adds on the voltage channel
pub fn vbat_offset(adc: i32) -> i32 {
    ADC_TO_VBAT_OFFSET.lookup(adc)
}

/// Voltage code to millivolts, 2.5 V to 4.5 V over 12 bits
pub fn adc_to_vbat(adc: i32, is_charging: bool) -> i32 {
    let a = if is_charging { adc - vbat_offset(adc) } else { adc };
    2500 + ((a * 2000) >> ADC_RESOLUTION_BITS)
}

/// SOC from the room-temperature table alone
pub fn adc_to_soc_room(profile: &BatteryProfile, adc: i32, is_charging: bool) -> i32 {
    let a = if is_charging { adc - vbat_offset(adc) } else { adc };
    interpolate(&profile.soc.adc_room, &profile.soc.soc, a)
}

/// SOC blended between the two bands bracketing the temperature
///
/// # Arguments
/// * `adc` - averaged voltage code
/// * `temperature_k` - tenths of a Kelvin, clamped into the band range
pub fn adc_to_soc_with_temperature(
    profile: &BatteryProfile,
    bands: &TemperatureBands,
    adc: i32,
    temperature_k: i32,
) -> i32 {
    let t = temperature_k.clamp(bands.low_low, bands.high);
    let soc = &profile.soc;

    let (upper, lower, t_upper, t_lower) = if t > bands.room {
        (&soc.adc_high, &soc.adc_room, bands.high, bands.room)
    } else if t > bands.low {
        (&soc.adc_room, &soc.adc_low, bands.room, bands.low)
    } else {
        (&soc.adc_low, &soc.adc_low_low, bands.low, bands.low_low)
    };

    let soc_upper = interpolate(upper, &soc.soc, adc);
    let soc_lower = interpolate(lower, &soc.soc, adc);
    soc_lower + (t - t_lower) * (soc_upper - soc_lower) / (t_upper - t_lower)
}

/// VF resistance in ohms for a 10 uA source
pub fn vf_ohm(adc: i32) -> u32 {
    let adc = adc.max(0) as u64;
    (((2500 * adc * 100_000) >> ADC_RESOLUTION_BITS) / 1000) as u32
}

/// Map a temperature onto the platform's own ADC scale
///
/// # Returns
/// None when the platform supplied no map
pub fn temperature_to_platform_adc(map: &[TemperatureMapPoint], temperature: i32) -> Option<i32> {
    if map.is_empty() {
        return None;
    }
    let temps: Vec<i32> = map.iter().map(|p| p.temperature).collect();
    let adcs: Vec<i32> = map.iter().map(|p| p.adc).collect();
    Some(interpolate(&temps, &adcs, temperature))
}
