use bitflags::bitflags;
use std::fmt;
use time::OffsetDateTime;

use crate::utils::{format_datetime, format_tenths};

/// Battery health as reported to the power-supply layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryHealth {
    #[default]
    Good,
    Overheat,
    Cold,
    Overvoltage,
    UnspecifiedFailure,
}

/// Operating status of the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryStatus {
    #[default]
    Discharging,
    Charging,
    NotCharging,
    Full,
}

/// Which charger currently owns the charging port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargerType {
    #[default]
    None,
    MainsTa,
    Usb,
}

impl ChargerType {
    pub fn is_attached(self) -> bool {
        self != ChargerType::None
    }
}

bitflags! {
    /// Every independent reason currently holding charging off.
    ///
    /// Bits are OR-ed in and cleared individually; charging only restarts once
    /// the whole mask is empty.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EndOfCharge: u8 {
        const BY_TIMER = 0x01;
        const BY_FULL = 0x02;
        const BY_OVP = 0x04;
        const BY_VF_OPEN = 0x08;
        const BY_TEMPERATURE = 0x10;
    }
}

/// Events raised by collaborators outside the core (charger IC, switch IC, sleep monitor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryEvent {
    TaAttached,
    TaDetached,
    UsbAttached,
    UsbDetached,
    JigAttached,
    JigDetached,
    ChargeFull,
    OvpChargeStop,
    OvpChargeRestart,
    SleepMonitor,
}

/// Which timer to arm when charging starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeTimerKind {
    /// Fresh charge, duration chosen by rated capacity
    Start,
    /// Top-up after a full charge
    Restart,
}

/// Point-in-time view of everything the power-supply layer reports
#[derive(Debug, Clone)]
pub struct BatterySnapshot {
    pub status: BatteryStatus,
    pub health: BatteryHealth,
    pub present: bool,
    pub soc: i32,
    pub technology: String,
    pub battery_type: String,
    pub voltage_now_mv: i32,
    pub voltage_avg_mv: i32,
    /// Average temperature in tenths of a degree Celsius
    pub temperature: i32,
    pub temperature_adc: i32,
    pub vf_adc: i32,
    pub charger: ChargerType,
    pub end_of_charge: EndOfCharge,
    pub is_charging: bool,
    pub taken_at: OffsetDateTime,
}

impl fmt::Display for BatterySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:?}/{:?} soc={}% vbat={}mV temp={}C charger={:?} eoc={:#04x}",
            format_datetime(&self.taken_at),
            self.status,
            self.health,
            self.soc,
            self.voltage_avg_mv,
            format_tenths(self.temperature),
            self.charger,
            self.end_of_charge.bits()
        )
    }
}
