use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use lipo_charge_monitor::utils::{format_datetime, format_tenths};
use lipo_charge_monitor::{
    BatteryConfig, BatteryEvent, BatteryMonitor, ChargerType, EndOfCharge, SimulatedPmic,
};

const SUMMARY_INTERVAL_SECS: u64 = 300; // 5 minutes
const CHARGER_ATTACH_DELAY_SECS: u64 = 5;

/// Charger the simulation plugs in, from `SIM_CHARGER`
fn simulated_charger() -> Option<BatteryEvent> {
    match env::var("SIM_CHARGER").ok()?.to_ascii_lowercase().as_str() {
        "ta" => Some(BatteryEvent::TaAttached),
        "usb" => Some(BatteryEvent::UsbAttached),
        other => {
            warn!("Ignoring unknown SIM_CHARGER '{}'", other);
            None
        }
    }
}

async fn main_loop(monitor: BatteryMonitor) -> Result<(), Box<dyn std::error::Error>> {
    monitor.start().await;

    if let Some(event) = simulated_charger() {
        sleep(Duration::from_secs(CHARGER_ATTACH_DELAY_SECS)).await;
        info!("Simulating {:?}", event);
        monitor.handle_event(event).await;
    }

    loop {
        sleep(Duration::from_secs(SUMMARY_INTERVAL_SECS)).await;

        let snapshot = monitor.snapshot();
        info!("Summary at {}:", format_datetime(&OffsetDateTime::now_utc()));
        info!("  Status: {:?} ({:?})", snapshot.status, snapshot.health);
        info!("  State of charge: {}%", snapshot.soc);
        info!(
            "  Voltage: {} mV (average {} mV)",
            snapshot.voltage_now_mv, snapshot.voltage_avg_mv
        );
        info!("  Temperature: {} C", format_tenths(snapshot.temperature));
        info!("  Charger: {:?}", snapshot.charger);
        info!("  End of charge: {:#04x}", snapshot.end_of_charge.bits());

        if !snapshot.present {
            warn!("No battery detected!");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BatteryConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new()))
        .config(config)
        .enable_charge(|charger: ChargerType| info!("Charger enabled for {:?}", charger))
        .disable_charge(|reason: EndOfCharge| {
            info!("Charger disabled, reason {:#04x}", reason.bits())
        })
        .build();

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(monitor.clone()) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    monitor.shutdown().await;
    Ok(())
}
