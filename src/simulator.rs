/// In-memory PMIC used by the demo binary and the tests
///
/// Every channel answers with a settable code. In manual mode a conversion
/// completes as soon as it is armed unless the simulator is stalled.
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adc::{AdcChannel, AdcCompletion, AdcMode, Pmic};
use crate::error::Result;

// Defaults: about 3.96 V, 25 C and a VF inside the accepted window
const DEFAULT_VOLTAGE_CODE: u16 = 3000;
const DEFAULT_TEMPERATURE_CODE: u16 = 360;
const DEFAULT_VF_CODE: u16 = 600;

pub struct SimulatedPmic {
    voltage: AtomicU16,
    temperature: AtomicU16,
    vf: AtomicU16,
    stalled: AtomicBool,
    registers: Mutex<HashMap<u8, u8>>,
    completion: Mutex<Option<Arc<AdcCompletion>>>,
}

impl Default for SimulatedPmic {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPmic {
    pub fn new() -> Self {
        Self {
            voltage: AtomicU16::new(DEFAULT_VOLTAGE_CODE),
            temperature: AtomicU16::new(DEFAULT_TEMPERATURE_CODE),
            vf: AtomicU16::new(DEFAULT_VF_CODE),
            stalled: AtomicBool::new(false),
            registers: Mutex::new(HashMap::new()),
            completion: Mutex::new(None),
        }
    }

    pub fn set_voltage_code(&self, code: u16) {
        self.voltage.store(code, Ordering::SeqCst);
    }

    pub fn set_temperature_code(&self, code: u16) {
        self.temperature.store(code, Ordering::SeqCst);
    }

    pub fn set_vf_code(&self, code: u16) {
        self.vf.store(code, Ordering::SeqCst);
    }

    /// A stalled converter never finishes a conversion
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    fn code_for(&self, channel: AdcChannel) -> u16 {
        match channel {
            AdcChannel::Voltage => self.voltage.load(Ordering::SeqCst),
            AdcChannel::Temperature1 | AdcChannel::Temperature2 => {
                self.temperature.load(Ordering::SeqCst)
            }
            AdcChannel::Vf => self.vf.load(Ordering::SeqCst),
            AdcChannel::Ain | AdcChannel::Tjunc => 0,
        }
    }
}

impl Pmic for SimulatedPmic {
    fn read_register(&self, addr: u8) -> Result<u8> {
        let registers = self.registers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(registers.get(&addr).copied().unwrap_or(0))
    }

    fn write_register(&self, addr: u8, value: u8) -> Result<()> {
        debug!("PMIC write {:#04x} = {:#04x}", addr, value);
        self.registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, value);
        Ok(())
    }

    fn arm_adc_channel(&self, channel: AdcChannel, mode: AdcMode) -> Result<()> {
        if mode == AdcMode::Manual && !self.stalled.load(Ordering::SeqCst) {
            let completion = self
                .completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(completion) = completion {
                completion.complete(channel, self.code_for(channel));
            }
        }
        Ok(())
    }

    fn poll_adc_result(&self, channel: AdcChannel) -> Result<(u16, bool)> {
        Ok((self.code_for(channel), !self.stalled.load(Ordering::SeqCst)))
    }

    fn bind_completion(&self, completion: Arc<AdcCompletion>) {
        *self.completion.lock().unwrap_or_else(PoisonError::into_inner) = Some(completion);
    }
}
