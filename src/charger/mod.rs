/// Charger ownership, enable/disable callbacks and charge timers
pub mod state_machine;
pub mod timers;

pub use timers::{charge_timer_duration, ChargeTimers, TimerKind, RECHARGE_CHECK_DELAY};

use log::{debug, info, warn};
use std::fmt;

use crate::models::{ChargerType, EndOfCharge};

/// Installed by the external charger driver to switch charging on
pub type EnableChargeFn = Box<dyn Fn(ChargerType) + Send + Sync>;
/// Installed by the external charger driver to switch charging off, with the reasons
pub type DisableChargeFn = Box<dyn Fn(EndOfCharge) + Send + Sync>;

/// Who owns the charging port and how to drive the charger
///
/// Guarded by its own lock, separate from the battery state. When both are
/// needed the battery state lock is always taken first.
#[derive(Default)]
pub struct ChargerState {
    pub charger: ChargerType,
    pub is_charging: bool,
    pub jig_connected: bool,
    /// Charger wake reference is held while a charger owns the port
    pub wake_held: bool,
    enable: Option<EnableChargeFn>,
    disable: Option<DisableChargeFn>,
}

impl ChargerState {
    pub fn register_enable(&mut self, enable: EnableChargeFn) {
        if self.enable.is_some() {
            info!("Replacing registered enable-charge callback");
        }
        self.enable = Some(enable);
    }

    pub fn register_disable(&mut self, disable: DisableChargeFn) {
        if self.disable.is_some() {
            info!("Replacing registered disable-charge callback");
        }
        self.disable = Some(disable);
    }

    pub fn has_enable_callback(&self) -> bool {
        self.enable.is_some()
    }

    /// Ask the charger driver to start charging
    ///
    /// # Returns
    /// false when no callback is registered yet
    pub fn enable_charge(&mut self) -> bool {
        match &self.enable {
            Some(enable) => {
                let charger = match self.charger {
                    ChargerType::None => ChargerType::MainsTa,
                    other => other,
                };
                enable(charger);
                self.is_charging = true;
                debug!("Enable charge issued for {:?}", charger);
                true
            }
            None => {
                warn!("Enable-charge callback is not registered");
                false
            }
        }
    }

    /// Ask the charger driver to stop charging for `reason`
    ///
    /// # Returns
    /// false when no callback is registered yet
    pub fn disable_charge(&mut self, reason: EndOfCharge) -> bool {
        match &self.disable {
            Some(disable) => {
                disable(reason);
                self.is_charging = false;
                debug!("Disable charge issued, reason {:#04x}", reason.bits());
                true
            }
            None => {
                warn!("Disable-charge callback is not registered");
                false
            }
        }
    }

    pub fn set_jig_connected(&mut self, connected: bool) {
        if self.jig_connected == connected {
            info!("JIG state unchanged ({})", connected);
            return;
        }
        self.jig_connected = connected;
    }
}

impl fmt::Debug for ChargerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargerState")
            .field("charger", &self.charger)
            .field("is_charging", &self.is_charging)
            .field("jig_connected", &self.jig_connected)
            .field("wake_held", &self.wake_held)
            .field("enable", &self.enable.is_some())
            .field("disable", &self.disable.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_missing_callbacks_are_not_fatal() {
        let mut state = ChargerState::default();
        assert!(!state.enable_charge());
        assert!(!state.disable_charge(EndOfCharge::BY_OVP));
        assert!(!state.is_charging);
    }

    #[test]
    fn test_callbacks_receive_charger_and_reason() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut state = ChargerState {
            charger: ChargerType::Usb,
            ..ChargerState::default()
        };

        let enabled = Arc::clone(&calls);
        state.register_enable(Box::new(move |charger| {
            enabled.lock().unwrap().push(format!("enable {:?}", charger))
        }));
        let disabled = Arc::clone(&calls);
        state.register_disable(Box::new(move |reason| {
            disabled.lock().unwrap().push(format!("disable {:#04x}", reason.bits()))
        }));

        assert!(state.enable_charge());
        assert!(state.is_charging);
        assert!(state.disable_charge(EndOfCharge::BY_TIMER | EndOfCharge::BY_TEMPERATURE));
        assert!(!state.is_charging);

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["enable Usb".to_string(), "disable 0x11".to_string()]
        );
    }
}
