use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

use lipo_charge_monitor::{
    BatteryConfig, BatteryEvent, BatteryHealth, BatteryMonitor, BatterySnapshot, BatteryStatus,
    ChargerType, EndOfCharge, SimulatedPmic, StatusListener,
};

const HOUR_SECS: u64 = 3600;
// thermistor codes
const ROOM_CODE: u16 = 360; // 25.0 C
const HOT_CODE: u16 = 99; // 63.0 C

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    statuses: Mutex<Vec<BatteryStatus>>,
}

impl StatusListener for Recorder {
    fn status_changed(&self, snapshot: &BatterySnapshot) {
        self.statuses.lock().unwrap().push(snapshot.status);
    }
}

fn build(pmic: &Arc<SimulatedPmic>, recorder: &Arc<Recorder>) -> BatteryMonitor {
    let enabled = Arc::clone(recorder);
    let disabled = Arc::clone(recorder);

    BatteryMonitor::builder(pmic.clone())
        .config(BatteryConfig::default())
        .listener(recorder.clone())
        .enable_charge(move |charger: ChargerType| {
            enabled.calls.lock().unwrap().push(format!("enable {:?}", charger))
        })
        .disable_charge(move |reason: EndOfCharge| {
            disabled
                .calls
                .lock()
                .unwrap()
                .push(format!("disable {:#04x}", reason.bits()))
        })
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_full_charge_cycle_with_timer_and_recharge() {
    let pmic = Arc::new(SimulatedPmic::new());
    let recorder = Arc::new(Recorder::default());
    let monitor = build(&pmic, &recorder);

    pmic.set_temperature_code(ROOM_CODE);
    pmic.set_voltage_code(2880);
    monitor.run_temperature_cycle().await;
    monitor.run_voltage_cycle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.soc, 70);
    assert_eq!(snapshot.temperature, 250);
    assert_eq!(snapshot.voltage_avg_mv, 3959);
    assert_eq!(snapshot.status, BatteryStatus::Discharging);

    monitor.handle_event(BatteryEvent::TaAttached).await;
    assert_eq!(monitor.status(), BatteryStatus::Charging);

    sleep(Duration::from_secs(6 * HOUR_SECS + 1)).await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, BatteryStatus::Full);
    assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TIMER);

    // 3959 mV is under the restart level, so the recharge check resumes
    sleep(Duration::from_secs(31)).await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, BatteryStatus::Charging);
    assert!(snapshot.end_of_charge.is_empty());

    monitor.handle_event(BatteryEvent::TaDetached).await;
    assert_eq!(monitor.status(), BatteryStatus::Discharging);

    assert_eq!(
        *recorder.calls.lock().unwrap(),
        vec![
            "enable MainsTa".to_string(),
            "disable 0x01".to_string(),
            "enable MainsTa".to_string(),
            "disable 0x00".to_string(),
        ]
    );
    let statuses = recorder.statuses.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec![
            // seeding the voltage average
            BatteryStatus::Discharging,
            BatteryStatus::Charging,
            BatteryStatus::Full,
            BatteryStatus::Charging,
            BatteryStatus::Discharging,
        ]
    );
    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_overheat_and_ovp_must_both_clear() {
    let pmic = Arc::new(SimulatedPmic::new());
    let recorder = Arc::new(Recorder::default());
    let monitor = build(&pmic, &recorder);

    pmic.set_temperature_code(HOT_CODE);
    monitor.run_temperature_cycle().await;
    assert_eq!(monitor.snapshot().temperature, 630);

    monitor.handle_event(BatteryEvent::TaAttached).await;
    monitor.run_temperature_cycle().await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.health, BatteryHealth::Overheat);
    assert_eq!(snapshot.status, BatteryStatus::NotCharging);
    assert!(!snapshot.is_charging);

    monitor.handle_event(BatteryEvent::OvpChargeStop).await;
    monitor.handle_event(BatteryEvent::OvpChargeRestart).await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_TEMPERATURE);
    assert_eq!(snapshot.status, BatteryStatus::NotCharging);

    // the average cools one slot per cycle
    pmic.set_temperature_code(ROOM_CODE);
    for _ in 0..16 {
        monitor.run_temperature_cycle().await;
        if monitor.status() == BatteryStatus::Charging {
            break;
        }
    }

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, BatteryStatus::Charging);
    assert_eq!(snapshot.health, BatteryHealth::Good);
    assert!(snapshot.end_of_charge.is_empty());
    assert!(snapshot.is_charging);
    assert!(snapshot.temperature <= 430);
}

#[tokio::test(start_paused = true)]
async fn test_open_vf_stops_charging_until_detach() {
    let pmic = Arc::new(SimulatedPmic::new());
    let recorder = Arc::new(Recorder::default());
    let monitor = build(&pmic, &recorder);

    monitor.handle_event(BatteryEvent::UsbAttached).await;
    pmic.set_vf_code(100);
    monitor.run_temperature_cycle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.health, BatteryHealth::UnspecifiedFailure);
    assert_eq!(snapshot.end_of_charge, EndOfCharge::BY_VF_OPEN);
    assert_eq!(snapshot.vf_adc, 100);

    monitor.handle_event(BatteryEvent::UsbDetached).await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.health, BatteryHealth::Good);
    assert!(snapshot.end_of_charge.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_started_monitor_tracks_discharge() {
    let pmic = Arc::new(SimulatedPmic::new());
    let recorder = Arc::new(Recorder::default());
    let monitor = build(&pmic, &recorder);
    pmic.set_voltage_code(2880);

    monitor.start().await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.soc(), 70);

    // SOC never rises while discharging
    pmic.set_voltage_code(3300);
    sleep(Duration::from_secs(600)).await;
    assert_eq!(monitor.soc(), 70);
    monitor.shutdown().await;
}
