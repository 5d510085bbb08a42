use log::{debug, info, warn};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tokio::time::Duration;

use crate::adc::AdcMode;
use crate::error::{BatteryError, Result};
use crate::estimator::SocAlgorithm;
use crate::utils::{c2k, is_strictly_ascending};

/// Temperature band boundaries in tenths of a Kelvin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureBands {
    pub low_low: i32,
    pub low: i32,
    pub room: i32,
    pub high: i32,
}

impl TemperatureBands {
    pub fn is_ordered(&self) -> bool {
        self.low_low < self.low && self.low < self.room && self.room < self.high
    }
}

impl Default for TemperatureBands {
    fn default() -> Self {
        Self {
            low_low: c2k(-200),
            low: c2k(0),
            room: c2k(200),
            high: c2k(450),
        }
    }
}

/// Charging protection window in tenths of a degree Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeTemperatureLimits {
    pub stop_high: i32,
    pub stop_low: i32,
    pub restart_high: i32,
    pub restart_low: i32,
}

impl ChargeTemperatureLimits {
    /// The restart window has to sit strictly inside the stop window
    pub fn is_ordered(&self) -> bool {
        self.stop_low < self.restart_low
            && self.restart_low <= self.restart_high
            && self.restart_high < self.stop_high
    }
}

impl Default for ChargeTemperatureLimits {
    fn default() -> Self {
        Self {
            stop_high: 600,
            stop_low: -50,
            restart_high: 430,
            restart_low: 0,
        }
    }
}

/// Re-arm delays of the periodic monitor tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorIntervals {
    pub voltage_start: Duration,
    pub voltage_fast: Duration,
    pub voltage_settle: Duration,
    pub voltage_normal: Duration,
    pub temperature_start: Duration,
    pub temperature_fast: Duration,
    pub temperature_normal: Duration,
    pub status_notify: Duration,
}

impl Default for MonitorIntervals {
    fn default() -> Self {
        Self {
            voltage_start: Duration::from_secs(1),
            voltage_fast: Duration::from_secs(3),
            voltage_settle: Duration::from_secs(20),
            voltage_normal: Duration::from_secs(60),
            temperature_start: Duration::from_millis(500),
            temperature_fast: Duration::from_secs(1),
            temperature_normal: Duration::from_secs(30),
            status_notify: Duration::from_secs(60),
        }
    }
}

/// One point of the platform's temperature to ADC map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureMapPoint {
    /// Tenths of a degree Celsius
    pub temperature: i32,
    pub adc: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryConfig {
    pub capacity_mah: u32,
    pub technology: String,
    pub battery_type: String,
    pub vf_lower: i32,
    pub vf_upper: i32,
    pub adc_mode: AdcMode,
    pub soc_algorithm: SocAlgorithm,
    pub bands: TemperatureBands,
    pub charge_temperature: ChargeTemperatureLimits,
    /// Charging restarts from Full below this battery voltage
    pub restart_voltage_mv: i32,
    /// An SOC of 0 is reported as 1 while the battery is above this voltage
    pub power_off_voltage_mv: i32,
    /// Voltage ADC level treated as the start of the constant-voltage phase
    pub cv_adc_level: i32,
    pub intervals: MonitorIntervals,
    pub adc_settle: Duration,
    pub adc_poll_interval: Duration,
    pub adc_poll_retries: u32,
    pub temperature_map: Vec<TemperatureMapPoint>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_mah: 1500,
            technology: "Li-ion".to_string(),
            battery_type: "SDI_SDI".to_string(),
            vf_lower: 150,
            vf_upper: 1500,
            adc_mode: AdcMode::Auto,
            soc_algorithm: SocAlgorithm::TemperatureCompensated,
            bands: TemperatureBands::default(),
            charge_temperature: ChargeTemperatureLimits::default(),
            restart_voltage_mv: 4140,
            power_off_voltage_mv: 3400,
            cv_adc_level: 3420,
            intervals: MonitorIntervals::default(),
            adc_settle: Duration::from_millis(5),
            adc_poll_interval: Duration::from_millis(1),
            adc_poll_retries: 20,
            temperature_map: Vec::new(),
        }
    }
}

impl BatteryConfig {
    /// Load the configuration from `.env` and `BATTERY_*` environment variables
    pub fn new() -> Result<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from the defaults
    ///
    /// Temperatures are given in tenths of a degree Celsius, durations in
    /// milliseconds or seconds as the key name says.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "BATTERY_CAPACITY_MAH")? {
            config.capacity_mah = v;
        }
        if let Some(v) = lookup("BATTERY_TECHNOLOGY") {
            config.technology = v.trim().to_string();
        }
        if let Some(v) = lookup("BATTERY_TYPE") {
            config.battery_type = v.trim().to_string();
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_VF_LOWER")? {
            config.vf_lower = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_VF_UPPER")? {
            config.vf_upper = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_ADC_MODE")? {
            config.adc_mode = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_SOC_ALGORITHM")? {
            config.soc_algorithm = v;
        }

        // Band thresholds are configured in tenths of a degree Celsius and kept in tenths of a Kelvin
        if let Some(v) = parse_var::<i32, _>(&lookup, "BATTERY_TEMP_LOW_LOW")? {
            config.bands.low_low = c2k(v);
        }
        if let Some(v) = parse_var::<i32, _>(&lookup, "BATTERY_TEMP_LOW")? {
            config.bands.low = c2k(v);
        }
        if let Some(v) = parse_var::<i32, _>(&lookup, "BATTERY_TEMP_ROOM")? {
            config.bands.room = c2k(v);
        }
        if let Some(v) = parse_var::<i32, _>(&lookup, "BATTERY_TEMP_HIGH")? {
            config.bands.high = c2k(v);
        }

        if let Some(v) = parse_var(&lookup, "BATTERY_CHARGE_STOP_HIGH")? {
            config.charge_temperature.stop_high = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_CHARGE_STOP_LOW")? {
            config.charge_temperature.stop_low = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_CHARGE_RESTART_HIGH")? {
            config.charge_temperature.restart_high = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_CHARGE_RESTART_LOW")? {
            config.charge_temperature.restart_low = v;
        }

        if let Some(v) = parse_var(&lookup, "BATTERY_RESTART_VOLTAGE_MV")? {
            config.restart_voltage_mv = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_POWER_OFF_VOLTAGE_MV")? {
            config.power_off_voltage_mv = v;
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_CV_ADC_LEVEL")? {
            config.cv_adc_level = v;
        }

        if let Some(v) = parse_var(&lookup, "BATTERY_VOLTAGE_NORMAL_SECS")? {
            config.intervals.voltage_normal = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_TEMPERATURE_NORMAL_SECS")? {
            config.intervals.temperature_normal = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_NOTIFY_INTERVAL_SECS")? {
            config.intervals.status_notify = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_ADC_POLL_INTERVAL_MS")? {
            config.adc_poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "BATTERY_ADC_POLL_RETRIES")? {
            config.adc_poll_retries = v;
        }

        if let Some(map) = lookup("BATTERY_TEMPERATURE_MAP") {
            config.temperature_map = parse_temperature_map(&map)?;
        }

        for err in config.validate() {
            warn!("{}", err);
        }

        info!(
            "Battery configuration: {} mAh {} ({}), ADC mode {}, {:?}",
            config.capacity_mah,
            config.technology,
            config.battery_type,
            config.adc_mode,
            config.soc_algorithm
        );

        Ok(config)
    }

    /// Revert every field that breaks a calibration invariant to its default
    ///
    /// # Returns
    /// One `CalibrationInconsistent` error per reverted field group
    pub fn validate(&mut self) -> Vec<BatteryError> {
        let defaults = Self::default();
        let mut errors = Vec::new();

        if self.vf_lower >= self.vf_upper {
            errors.push(BatteryError::CalibrationInconsistent(format!(
                "vf_lower ({}) must be below vf_upper ({})",
                self.vf_lower, self.vf_upper
            )));
            self.vf_lower = defaults.vf_lower;
            self.vf_upper = defaults.vf_upper;
        }

        if !self.bands.is_ordered() {
            errors.push(BatteryError::CalibrationInconsistent(format!(
                "temperature bands out of order: {:?}",
                self.bands
            )));
            self.bands = defaults.bands;
        }

        if !self.charge_temperature.is_ordered() {
            errors.push(BatteryError::CalibrationInconsistent(format!(
                "charge temperature limits out of order: {:?}",
                self.charge_temperature
            )));
            self.charge_temperature = defaults.charge_temperature;
        }

        if self.power_off_voltage_mv >= self.restart_voltage_mv {
            errors.push(BatteryError::CalibrationInconsistent(format!(
                "power-off voltage ({} mV) must be below restart voltage ({} mV)",
                self.power_off_voltage_mv, self.restart_voltage_mv
            )));
            self.power_off_voltage_mv = defaults.power_off_voltage_mv;
            self.restart_voltage_mv = defaults.restart_voltage_mv;
        }

        let temps: Vec<i32> = self.temperature_map.iter().map(|p| p.temperature).collect();
        if !is_strictly_ascending(&temps) {
            errors.push(BatteryError::CalibrationInconsistent(
                "platform temperature map must be ascending in temperature".to_string(),
            ));
            self.temperature_map = defaults.temperature_map;
        }

        errors
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            debug!("Found {}: '{}'", key, raw);
            raw.trim().parse::<T>().map(Some).map_err(|e| {
                BatteryError::InvalidArgument(format!("{}='{}': {}", key, raw, e))
            })
        }
        None => Ok(None),
    }
}

/// Parse `temperature:adc` pairs separated by commas, e.g. `-200:1800,0:1500`
fn parse_temperature_map(raw: &str) -> Result<Vec<TemperatureMapPoint>> {
    let mut points = Vec::new();

    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (temperature, adc) = pair.split_once(':').ok_or_else(|| {
            BatteryError::InvalidArgument(format!("temperature map entry '{}' lacks ':'", pair))
        })?;
        let temperature = temperature.trim().parse::<i32>().map_err(|e| {
            BatteryError::InvalidArgument(format!("temperature map entry '{}': {}", pair, e))
        })?;
        let adc = adc.trim().parse::<i32>().map_err(|e| {
            BatteryError::InvalidArgument(format!("temperature map entry '{}': {}", pair, e))
        })?;

        points.push(TemperatureMapPoint { temperature, adc });
    }

    debug!("Temperature map points loaded: {}", points.len());
    Ok(points)
}
