//! Fuel gauge and charge control for a single-cell LiPo battery behind a
//! PMIC's 12-bit ADC.
//!
//! [`BatteryMonitor`] samples voltage and temperature on its own schedule,
//! turns them into a filtered state of charge, and runs the charge state
//! machine on the events the platform feeds it.
pub mod adc;
pub mod charger;
pub mod config;
pub mod error;
pub mod estimator;
pub mod models;
pub mod monitor;
pub mod scheduler;
pub mod simulator;
pub mod tables;
pub mod utils;

pub use adc::{AdcChannel, AdcMode, Pmic};
pub use config::BatteryConfig;
pub use error::{BatteryError, Result};
pub use estimator::SocAlgorithm;
pub use models::{
    BatteryEvent, BatteryHealth, BatterySnapshot, BatteryStatus, ChargerType, EndOfCharge,
};
pub use monitor::{BatteryMonitor, BatteryMonitorBuilder, LogListener, StatusListener};
pub use scheduler::Job;
pub use simulator::SimulatedPmic;
