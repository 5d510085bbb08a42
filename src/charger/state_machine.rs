/// Charge control: charger attach/detach, charge timers, and the OVP, VF and
/// temperature protections
///
/// Every stop records its reason in the end-of-charge mask. Reasons are
/// cleared one at a time and charging only resumes once the mask is empty.
/// Enable/disable callbacks run with the state and charger locks held.
use log::{error, info, warn};

use super::{charge_timer_duration, ChargeTimers, ChargerState, TimerKind, RECHARGE_CHECK_DELAY};
use crate::adc::ADC_MAX_CODE;
use crate::error::BatteryError;
use crate::estimator::{adc_to_vbat, BatteryState};
use crate::models::{BatteryHealth, BatteryStatus, ChargeTimerKind, ChargerType, EndOfCharge};
use crate::monitor::Shared;

impl Shared {
    /// Enable the charger and arm a fresh charge timer
    pub(crate) fn start_charge(
        &self,
        state: &mut BatteryState,
        charger: &mut ChargerState,
        kind: ChargeTimerKind,
    ) {
        info!("Start charging ({:?} timer)", kind);
        if !charger.enable_charge() {
            error!("Failed to enable charge");
        }

        let mut timers = self.lock_timers();
        self.cancel_charge_timers(state, &mut timers);
        timers.arm(
            TimerKind::Charge,
            charge_timer_duration(self.config.capacity_mah, kind),
            self.me.clone(),
        );
    }

    /// Disable the charger and drop any pending charge timers
    pub(crate) fn stop_charge(
        &self,
        state: &mut BatteryState,
        charger: &mut ChargerState,
        reason: EndOfCharge,
    ) {
        info!("Stop charging, reason {:#04x}", reason.bits());
        if !charger.disable_charge(reason) {
            warn!("Failed to disable charge");
        }

        let mut timers = self.lock_timers();
        self.cancel_charge_timers(state, &mut timers);
    }

    fn cancel_charge_timers(&self, state: &mut BatteryState, timers: &mut ChargeTimers) {
        if timers.cancel(TimerKind::Charge) {
            info!("Charge timer was running, cancelled");
        }
        if timers.cancel(TimerKind::Recharge) {
            info!("Recharge timer was running, cancelled");
            state.end_of_charge.remove(EndOfCharge::BY_TIMER);
        }
    }

    /// TA or USB plugged in or out
    pub(crate) fn set_charger_attached(&self, kind: ChargerType, attached: bool) {
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();
            info!(
                "{:?} {}, current charger {:?}",
                kind,
                if attached { "attached" } else { "detached" },
                charger.charger
            );

            if attached {
                if charger.charger == ChargerType::None {
                    charger.wake_held = true;
                    charger.charger = kind;
                    self.start_charge(&mut state, &mut charger, ChargeTimerKind::Start);
                    state.status = BatteryStatus::Charging;
                    true
                } else {
                    false
                }
            } else if charger.charger == kind {
                charger.charger = ChargerType::None;
                state.end_of_charge = EndOfCharge::empty();
                state.status = BatteryStatus::Discharging;
                state.health = BatteryHealth::Good;
                self.stop_charge(&mut state, &mut charger, EndOfCharge::empty());
                charger.wake_held = false;
                true
            } else {
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    pub(crate) fn set_jig_attached(&self, attached: bool) {
        info!("JIG {}", if attached { "attached" } else { "detached" });
        self.lock_charger().set_jig_connected(attached);
    }

    /// The charger IC reported charge termination
    pub(crate) fn charge_full(&self) {
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();

            if charger.charger.is_attached() {
                if state.soc != 100 {
                    if state.soc >= 99 {
                        state.soc = 100;
                        state.soc_filter.force(100);
                    }
                    info!("Charge full at SOC {}%", state.soc);
                }

                state.end_of_charge.insert(EndOfCharge::BY_FULL);
                state.status = BatteryStatus::Full;
                self.stop_charge(&mut state, &mut charger, EndOfCharge::BY_FULL);
                true
            } else {
                info!("Can not make battery full, there is no charger");
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    pub(crate) fn ovp_charge_stop(&self) {
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();

            if charger.charger.is_attached() {
                state.health = BatteryHealth::Overvoltage;
                self.hold_charging(&mut state, &mut charger, EndOfCharge::BY_OVP);
                true
            } else {
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    pub(crate) fn ovp_charge_restart(&self) {
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();

            if charger.charger.is_attached() && state.end_of_charge.contains(EndOfCharge::BY_OVP) {
                state.end_of_charge.remove(EndOfCharge::BY_OVP);
                if state.health == BatteryHealth::Overvoltage {
                    state.health = BatteryHealth::Good;
                }

                if state.end_of_charge.is_empty() {
                    info!("Restart charge, recovered from OVP");
                    state.status = BatteryStatus::Charging;
                    self.start_charge(&mut state, &mut charger, ChargeTimerKind::Start);
                } else {
                    info!(
                        "Recovered from OVP, still held by {:#04x}",
                        state.end_of_charge.bits()
                    );
                }
                true
            } else {
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    /// Record `reason` and stop if charging, or only record it if already stopped
    fn hold_charging(
        &self,
        state: &mut BatteryState,
        charger: &mut ChargerState,
        reason: EndOfCharge,
    ) {
        match state.status {
            BatteryStatus::Charging => {
                info!("Stop charging by {:?}", reason);
                state.end_of_charge.insert(reason);
                state.status = BatteryStatus::NotCharging;
                self.stop_charge(state, charger, reason);
            }
            BatteryStatus::NotCharging | BatteryStatus::Full => {
                info!("Charging had already been stopped, adding {:?}", reason);
                state.end_of_charge.insert(reason);
            }
            BatteryStatus::Discharging => {}
        }
    }

    fn vf_charge_stop(&self, state: &mut BatteryState, charger: &mut ChargerState) {
        if charger.charger.is_attached() {
            state.health = BatteryHealth::UnspecifiedFailure;
            self.hold_charging(state, charger, EndOfCharge::BY_VF_OPEN);
        }
    }

    /// Judge an averaged VF reading against the accepted resistor window
    pub(crate) fn check_vf(&self, vf: i32) {
        let (lower, upper) = (self.config.vf_lower, self.config.vf_upper);
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();
            state.apply_vf_sample(vf);

            if lower >= upper {
                error!(
                    "{}",
                    BatteryError::CalibrationInconsistent(format!(
                        "vf_lower ({}) >= vf_upper ({})",
                        lower, upper
                    ))
                );
                false
            } else if vf == i32::from(ADC_MAX_CODE) {
                warn!("{}", BatteryError::BatteryAbsent(ADC_MAX_CODE));
                state.present = false;
                true
            } else if vf < lower || vf > upper {
                error!(
                    "Wrong battery detected. VF({}), vf_lower({}), vf_upper({})",
                    vf, lower, upper
                );
                self.vf_charge_stop(&mut state, &mut charger);
                true
            } else if !state.present {
                info!("Battery present again, VF {}", vf);
                state.present = true;
                true
            } else {
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    /// Stop charging outside the stop window, resume inside the restart window
    ///
    /// Recovery applies while health says Cold/Overheat or while a temperature
    /// reason is still recorded, since an OVP recovery may have reset health.
    pub(crate) fn check_temperature_protection(&self) {
        let limits = self.config.charge_temperature;
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();
            let temperature = state.average_temperature;
            let thermal_health =
                matches!(state.health, BatteryHealth::Cold | BatteryHealth::Overheat);

            if thermal_health || state.end_of_charge.contains(EndOfCharge::BY_TEMPERATURE) {
                if (limits.restart_low..=limits.restart_high).contains(&temperature) {
                    if thermal_health {
                        state.health = BatteryHealth::Good;
                    }

                    if state.end_of_charge.contains(EndOfCharge::BY_TEMPERATURE) {
                        state.end_of_charge.remove(EndOfCharge::BY_TEMPERATURE);
                        if state.end_of_charge.is_empty() {
                            info!("Restart charge, temperature is normal");
                            state.status = BatteryStatus::Charging;
                            self.start_charge(&mut state, &mut charger, ChargeTimerKind::Start);
                        } else {
                            warn!(
                                "Can't restart charge, reason {:#04x}",
                                state.end_of_charge.bits()
                            );
                        }
                    } else {
                        info!("Temperature is normal");
                    }
                    true
                } else if state.status == BatteryStatus::Charging {
                    info!("Stop charging, charger inserted while cold or overheated");
                    self.hold_charging(&mut state, &mut charger, EndOfCharge::BY_TEMPERATURE);
                    true
                } else {
                    false
                }
            } else {
                let too_hot = temperature >= limits.stop_high;
                let too_cold = temperature <= limits.stop_low;
                if charger.charger.is_attached() && (too_hot || too_cold) {
                    state.health = if too_hot {
                        BatteryHealth::Overheat
                    } else {
                        BatteryHealth::Cold
                    };
                    self.hold_charging(&mut state, &mut charger, EndOfCharge::BY_TEMPERATURE);
                    true
                } else {
                    false
                }
            }
        };

        if changed {
            self.notify_status();
        }
    }

    /// Restart from Full once the raw voltage sags below the restart level
    pub(crate) fn check_recharge_condition(&self) {
        let restart_mv = self.config.restart_voltage_mv;
        let changed = {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();
            let vbat = adc_to_vbat(state.origin_voltage_adc, charger.is_charging);

            if state.status == BatteryStatus::Full
                && vbat < restart_mv
                && state.end_of_charge.contains(EndOfCharge::BY_FULL)
            {
                state.end_of_charge.remove(EndOfCharge::BY_FULL);
                if state.end_of_charge.is_empty() {
                    info!("Restart charging, voltage is lower than {} mV", restart_mv);
                    self.start_charge(&mut state, &mut charger, ChargeTimerKind::Restart);
                    state.status = BatteryStatus::Charging;
                    true
                } else {
                    info!(
                        "Can't restart charge, reason {:#04x}",
                        state.end_of_charge.bits()
                    );
                    false
                }
            } else {
                false
            }
        };

        if changed {
            self.notify_status();
        }
    }

    /// Entry point for an expired charge or recharge timer
    pub(crate) fn on_timer_fired(&self, kind: TimerKind, id: u64) {
        {
            let mut state = self.lock_state();
            let mut charger = self.lock_charger();
            if !self.lock_timers().claim_fired(kind, id) {
                return;
            }

            match kind {
                TimerKind::Charge => self.charge_timer_expired(&mut state, &mut charger),
                TimerKind::Recharge => self.recharge_timer_expired(&mut state, &mut charger),
            }
        }

        self.notify_status();
    }

    fn charge_timer_expired(&self, state: &mut BatteryState, charger: &mut ChargerState) {
        info!("Charge timer expired");
        state.end_of_charge.insert(EndOfCharge::BY_TIMER);
        state.status = BatteryStatus::Full;
        self.stop_charge(state, charger, EndOfCharge::BY_TIMER);

        self.lock_timers()
            .arm(TimerKind::Recharge, RECHARGE_CHECK_DELAY, self.me.clone());
    }

    fn recharge_timer_expired(&self, state: &mut BatteryState, charger: &mut ChargerState) {
        let restart_mv = self.config.restart_voltage_mv;

        if !state.end_of_charge.contains(EndOfCharge::BY_TIMER) {
            info!("Timer reason had been cleared by another event");
            return;
        }

        state.end_of_charge.remove(EndOfCharge::BY_TIMER);
        if !state.end_of_charge.is_empty() {
            info!(
                "Can't restart charge, reason {:#04x}",
                state.end_of_charge.bits()
            );
            return;
        }

        if state.status == BatteryStatus::Full && state.average_voltage_mv < restart_mv {
            info!("Restart charge, voltage is lower than {} mV", restart_mv);
            self.start_charge(state, charger, ChargeTimerKind::Restart);
            state.status = BatteryStatus::Charging;
        } else {
            info!("Battery full, voltage is above {} mV", restart_mv);
            state.end_of_charge.insert(EndOfCharge::BY_FULL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charger::TimerKind;
    use crate::models::BatteryEvent;
    use crate::monitor::BatteryMonitor;
    use crate::simulator::SimulatedPmic;
    use std::sync::{Arc, Mutex};
    use tokio::time::{sleep, Duration};

    const HOUR: u64 = 3600;

    fn monitor_with_calls() -> (BatteryMonitor, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let enabled = Arc::clone(&calls);
        let disabled = Arc::clone(&calls);

        let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new()))
            .enable_charge(move |charger| {
                enabled.lock().unwrap().push(format!("enable {:?}", charger))
            })
            .disable_charge(move |reason| {
                disabled
                    .lock()
                    .unwrap()
                    .push(format!("disable {:#04x}", reason.bits()))
            })
            .build();
        (monitor, calls)
    }

    fn set_temperature(monitor: &BatteryMonitor, deci_celsius: i32) {
        monitor.shared.lock_state().average_temperature = deci_celsius;
        monitor.shared.check_temperature_protection();
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_starts_charging_with_capacity_timer() {
        let (monitor, calls) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Charging);
        assert_eq!(snapshot.charger, ChargerType::MainsTa);
        assert!(snapshot.is_charging);
        assert!(monitor.shared.lock_charger().wake_held);
        assert!(monitor.shared.lock_timers().is_pending(TimerKind::Charge));
        assert_eq!(*calls.lock().unwrap(), vec!["enable MainsTa".to_string()]);

        // 1500 mAh charges for six hours
        sleep(Duration::from_secs(6 * HOUR - 1)).await;
        assert_eq!(monitor.snapshot().status, BatteryStatus::Charging);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.snapshot().status, BatteryStatus::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expiry_then_recharge_below_threshold() {
        let (monitor, calls) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::UsbAttached).await;

        sleep(Duration::from_secs(6 * HOUR + 1)).await;
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Full);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TIMER);
        assert!(!snapshot.is_charging);
        assert!(monitor.shared.lock_timers().is_pending(TimerKind::Recharge));

        monitor.shared.lock_state().average_voltage_mv = 4000;
        sleep(RECHARGE_CHECK_DELAY + Duration::from_secs(1)).await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Charging);
        assert!(snapshot.end_of_charge.is_empty());
        assert!(snapshot.is_charging);
        assert!(monitor.shared.lock_timers().is_pending(TimerKind::Charge));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "enable Usb".to_string(),
                "disable 0x01".to_string(),
                "enable Usb".to_string()
            ]
        );

        // the restart charge is bounded by 90 minutes
        sleep(Duration::from_secs(90 * 60 + 1)).await;
        assert_eq!(monitor.snapshot().status, BatteryStatus::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recharge_with_high_voltage_marks_full() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.shared.lock_state().average_voltage_mv = 4190;

        sleep(Duration::from_secs(6 * HOUR) + RECHARGE_CHECK_DELAY + Duration::from_secs(1)).await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Full);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_FULL);
        assert!(!snapshot.is_charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_faults_need_both_cleared() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;

        set_temperature(&monitor, 650);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.health, BatteryHealth::Overheat);
        assert_eq!(snapshot.status, BatteryStatus::NotCharging);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TEMPERATURE);

        monitor.handle_event(BatteryEvent::OvpChargeStop).await;
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.health, BatteryHealth::Overvoltage);
        assert_eq!(
            snapshot.end_of_charge,
            EndOfCharge::BY_TEMPERATURE | EndOfCharge::BY_OVP
        );

        // OVP clears but the temperature reason still holds charging off
        monitor.handle_event(BatteryEvent::OvpChargeRestart).await;
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TEMPERATURE);
        assert_eq!(snapshot.status, BatteryStatus::NotCharging);
        assert!(!snapshot.is_charging);

        // still hot: the recorded reason keeps charging off
        set_temperature(&monitor, 650);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TEMPERATURE);
        assert_eq!(snapshot.status, BatteryStatus::NotCharging);

        set_temperature(&monitor, 250);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.health, BatteryHealth::Good);
        assert_eq!(snapshot.status, BatteryStatus::Charging);
        assert!(snapshot.end_of_charge.is_empty());
        assert!(snapshot.is_charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_charger_insert_is_held() {
        let (monitor, _) = monitor_with_calls();
        monitor.shared.lock_state().average_temperature = -100;
        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.shared.check_temperature_protection();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.health, BatteryHealth::Cold);
        assert_eq!(snapshot.status, BatteryStatus::NotCharging);

        // between stop and restart limits nothing changes
        set_temperature(&monitor, -20);
        assert_eq!(monitor.snapshot().health, BatteryHealth::Cold);
        set_temperature(&monitor, 10);
        assert_eq!(monitor.snapshot().status, BatteryStatus::Charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_resets_everything() {
        let (monitor, calls) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.handle_event(BatteryEvent::OvpChargeStop).await;
        // detaching a charger that does not own the port is ignored
        monitor.handle_event(BatteryEvent::UsbDetached).await;
        assert_eq!(monitor.snapshot().charger, ChargerType::MainsTa);

        monitor.handle_event(BatteryEvent::TaDetached).await;
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Discharging);
        assert_eq!(snapshot.health, BatteryHealth::Good);
        assert_eq!(snapshot.charger, ChargerType::None);
        assert!(snapshot.end_of_charge.is_empty());
        assert!(!monitor.shared.lock_charger().wake_held);
        assert!(!monitor.shared.lock_timers().is_pending(TimerKind::Charge));
        assert_eq!(calls.lock().unwrap().last().unwrap(), "disable 0x00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_charger_does_not_take_port() {
        let (monitor, calls) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::UsbAttached).await;
        monitor.handle_event(BatteryEvent::TaAttached).await;
        assert_eq!(monitor.snapshot().charger, ChargerType::Usb);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vf_presence_and_open_battery() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;

        monitor.shared.check_vf(0xFFF);
        let snapshot = monitor.snapshot();
        assert!(!snapshot.present);
        // absence alone does not stop charging
        assert_eq!(snapshot.status, BatteryStatus::Charging);

        monitor.shared.check_vf(600);
        assert!(monitor.snapshot().present);
        assert_eq!(monitor.shared.lock_state().vf_ohm, 36621);

        monitor.shared.check_vf(50);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.health, BatteryHealth::UnspecifiedFailure);
        assert_eq!(snapshot.status, BatteryStatus::NotCharging);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_VF_OPEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_charge_full_event() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::ChargeFull).await;
        // without a charger the event is ignored
        assert_eq!(monitor.snapshot().status, BatteryStatus::Discharging);

        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.shared.lock_state().soc = 99;
        monitor.handle_event(BatteryEvent::ChargeFull).await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.soc, 100);
        assert_eq!(snapshot.status, BatteryStatus::Full);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_FULL);
        assert!(!monitor.shared.lock_timers().is_pending(TimerKind::Charge));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recharge_condition_from_monitor() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.handle_event(BatteryEvent::ChargeFull).await;

        // 3000 reads about 3964 mV, under the 4140 mV restart level
        monitor.shared.lock_state().origin_voltage_adc = 3000;
        monitor.shared.check_recharge_condition();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Charging);
        assert!(snapshot.end_of_charge.is_empty());
        assert!(snapshot.is_charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recharge_condition_needs_charger_full() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::TaAttached).await;
        sleep(Duration::from_secs(6 * HOUR + 1)).await;

        // full by timer only, the voltage check leaves it to the recharge timer
        monitor.shared.lock_state().origin_voltage_adc = 3000;
        monitor.shared.check_recharge_condition();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Full);
        assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TIMER);
        assert!(!snapshot.is_charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_charging_proceeds_without_callbacks() {
        let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new())).build();
        monitor.handle_event(BatteryEvent::TaAttached).await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, BatteryStatus::Charging);
        assert!(!snapshot.is_charging);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jig_toggles_flag() {
        let (monitor, _) = monitor_with_calls();
        monitor.handle_event(BatteryEvent::JigAttached).await;
        assert!(monitor.shared.lock_charger().jig_connected);
        monitor.handle_event(BatteryEvent::JigDetached).await;
        assert!(!monitor.shared.lock_charger().jig_connected);
    }
}
