/// Battery monitor: owns the shared state, runs the periodic jobs and
/// dispatches external events into the charge state machine
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use time::OffsetDateTime;
use tokio::time::Duration;

use crate::adc::{AdcChannel, AdcEngine, Calibration, Pmic};
use crate::charger::{ChargeTimers, ChargerState, DisableChargeFn, EnableChargeFn};
use crate::config::BatteryConfig;
use crate::error::BatteryError;
use crate::estimator::{
    temperature_to_platform_adc, BatteryState, Estimator, EstimatorPhase, AVG_SIZE,
};
use crate::models::{
    BatteryEvent, BatteryHealth, BatterySnapshot, BatteryStatus, ChargerType, EndOfCharge,
};
use crate::scheduler::{Job, Scheduler, TaskBody};
use crate::tables::shared_tables_consistent;

/// Receives everything the monitor publishes
pub trait StatusListener: Send + Sync {
    /// Battery status changed or the periodic notification is due
    fn status_changed(&self, snapshot: &BatterySnapshot);

    /// Packed averages after each voltage run, see [`BatteryState::raw_adc_composite`]
    fn raw_adc_available(&self, _composite: u32) {}
}

/// Listener that writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl StatusListener for LogListener {
    fn status_changed(&self, snapshot: &BatterySnapshot) {
        info!("{}", snapshot);
    }

    fn raw_adc_available(&self, composite: u32) {
        debug!("Raw ADC composite {:#08x}", composite);
    }
}

/// State shared by the periodic jobs, charge timers and event handlers
///
/// Lock order is state, then charger, then timers. Listeners and callbacks
/// never run with the timers lock held, and listeners run with no lock held.
pub(crate) struct Shared {
    pub(crate) me: Weak<Shared>,
    pub(crate) config: BatteryConfig,
    pub(crate) estimator: Estimator,
    pub(crate) adc: AdcEngine,
    state: Mutex<BatteryState>,
    charger: Mutex<ChargerState>,
    timers: Mutex<ChargeTimers>,
    listener: Arc<dyn StatusListener>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, BatteryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_charger(&self) -> MutexGuard<'_, ChargerState> {
        self.charger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_timers(&self) -> MutexGuard<'_, ChargeTimers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> BatterySnapshot {
        let state = self.lock_state();
        let charger = self.lock_charger();

        BatterySnapshot {
            status: state.status,
            health: state.health,
            present: state.present,
            soc: state.soc,
            technology: self.config.technology.clone(),
            battery_type: self.config.battery_type.clone(),
            voltage_now_mv: state.current_voltage_mv,
            voltage_avg_mv: state.average_voltage_mv,
            temperature: state.average_temperature,
            temperature_adc: state.average_temperature_adc(),
            vf_adc: state.vf_adc,
            charger: charger.charger,
            end_of_charge: state.end_of_charge,
            is_charging: charger.is_charging,
            taken_at: OffsetDateTime::now_utc(),
        }
    }

    /// Publish the current snapshot; must be called with no lock held
    pub(crate) fn notify_status(&self) {
        let snapshot = self.snapshot();
        self.listener.status_changed(&snapshot);
    }

    /// One voltage measurement
    ///
    /// # Returns
    /// Delay until the next voltage measurement
    pub(crate) async fn run_voltage_cycle(&self) -> Duration {
        let intervals = self.config.intervals;
        let is_charging = {
            let charger = self.lock_charger();
            if !charger.has_enable_callback() {
                warn!("Charge callbacks are not registered yet, voltage monitor waiting");
                return intervals.voltage_start;
            }
            charger.is_charging
        };

        let code = match self.adc.read_channel(AdcChannel::Voltage).await {
            Ok(code) => i32::from(code),
            Err(e) => {
                error!("Read voltage ADC failure: {}", e);
                return intervals.voltage_fast;
            }
        };

        let calibration = self.bootstrap_calibration();
        let sample = {
            let mut state = self.lock_state();
            let sample =
                self.estimator
                    .apply_voltage_sample(&mut state, code, is_charging, calibration);
            self.estimator.update_soc(&mut state, is_charging);
            debug!(
                "Voltage ADC {} -> {}, weight {}, offset {}",
                code, sample.corrected_adc, sample.weight, sample.offset
            );
            sample
        };

        if sample.bootstrapped {
            info!("Battery data initialized");
            self.notify_status();
        }

        self.check_recharge_condition();

        let (interval, composite) = {
            let state = self.lock_state();
            let charger = self.lock_charger();
            let interval = if !state.voltage_initialized() || charger.charger.is_attached() {
                intervals.voltage_fast
            } else if state.samples_since_bootstrap < AVG_SIZE {
                intervals.voltage_settle
            } else {
                intervals.voltage_normal
            };
            (interval, state.raw_adc_composite())
        };

        self.listener.raw_adc_available(composite);
        interval
    }

    /// Calibration is only consulted for the sample that seeds the average
    fn bootstrap_calibration(&self) -> Calibration {
        {
            let mut state = self.lock_state();
            if state.phase == EstimatorPhase::SteadyState {
                return Calibration::default();
            }
            state.phase = EstimatorPhase::Bootstrapping;
        }

        match self.adc.read_calibration() {
            Ok(calibration) => {
                info!("Bootloader calibration {:?}", calibration);
                calibration
            }
            Err(e) => {
                warn!("Calibration registers unreadable: {}", e);
                Calibration::default()
            }
        }
    }

    /// One temperature measurement plus the temperature and VF protections
    ///
    /// # Returns
    /// Delay until the next temperature measurement
    pub(crate) async fn run_temperature_cycle(&self) -> Duration {
        let intervals = self.config.intervals;
        let ready = self.lock_charger().has_enable_callback();
        if !ready {
            warn!("Charge callbacks are not registered yet, temperature monitor waiting");
            return intervals.temperature_fast;
        }

        let code = match self.adc.read_channel(AdcChannel::Temperature2).await {
            Ok(code) => i32::from(code),
            Err(e) => {
                error!("Read temperature ADC failure: {}", e);
                return intervals.temperature_fast;
            }
        };

        let interval = {
            let mut state = self.lock_state();
            state.apply_temperature_sample(code);
            debug!(
                "Temperature ADC {}, average {}, {} (avg {})",
                code,
                state.average_temperature_adc(),
                state.current_temperature,
                state.average_temperature
            );
            if state.temperature_initialized() {
                intervals.temperature_normal
            } else {
                intervals.temperature_fast
            }
        };

        self.check_temperature_protection();

        let vf_due = {
            let state = self.lock_state();
            let charger = self.lock_charger();
            charger.charger.is_attached()
                && state.health != BatteryHealth::UnspecifiedFailure
                && !charger.jig_connected
        };
        if vf_due {
            match self.adc.read_vf().await {
                Ok(vf) => self.check_vf(i32::from(vf)),
                Err(e) => error!("Read VF ADC failure: {}", e),
            }
        }

        interval
    }

    fn run_status_cycle(&self) -> Duration {
        self.notify_status();
        self.config.intervals.status_notify
    }
}

/// Handle to a running battery monitor
///
/// Cheap to clone; every clone drives the same monitor.
#[derive(Clone)]
pub struct BatteryMonitor {
    pub(crate) shared: Arc<Shared>,
    scheduler: Arc<Scheduler>,
}

impl BatteryMonitor {
    pub fn builder(pmic: Arc<dyn Pmic>) -> BatteryMonitorBuilder {
        BatteryMonitorBuilder {
            pmic,
            config: BatteryConfig::default(),
            listener: Arc::new(LogListener),
            enable: None,
            disable: None,
        }
    }

    /// Schedule the voltage, temperature and status jobs at their start delays
    pub async fn start(&self) {
        let intervals = self.shared.config.intervals;
        info!(
            "Starting battery monitor, {} mAh, {} strategy",
            self.shared.config.capacity_mah,
            self.shared.estimator.strategy_name()
        );

        self.scheduler
            .schedule(Job::TemperatureMonitor, intervals.temperature_start)
            .await;
        self.scheduler
            .schedule(Job::VoltageMonitor, intervals.voltage_start)
            .await;
        self.scheduler
            .schedule(Job::StatusNotify, intervals.status_notify)
            .await;
    }

    pub async fn handle_event(&self, event: BatteryEvent) {
        debug!("Event {:?}", event);
        let shared = &self.shared;
        match event {
            BatteryEvent::TaAttached => shared.set_charger_attached(ChargerType::MainsTa, true),
            BatteryEvent::TaDetached => shared.set_charger_attached(ChargerType::MainsTa, false),
            BatteryEvent::UsbAttached => shared.set_charger_attached(ChargerType::Usb, true),
            BatteryEvent::UsbDetached => shared.set_charger_attached(ChargerType::Usb, false),
            BatteryEvent::JigAttached => shared.set_jig_attached(true),
            BatteryEvent::JigDetached => shared.set_jig_attached(false),
            BatteryEvent::ChargeFull => shared.charge_full(),
            BatteryEvent::OvpChargeStop => shared.ovp_charge_stop(),
            BatteryEvent::OvpChargeRestart => shared.ovp_charge_restart(),
            BatteryEvent::SleepMonitor => self.sleep_monitor_tick().await,
        }
    }

    /// Periodic wake from suspend: take fresh readings right away
    async fn sleep_monitor_tick(&self) {
        self.shared.lock_state().ticker = true;
        info!("Sleep monitor tick, refreshing battery readings");
        self.schedule_all_now().await;
    }

    async fn schedule_all_now(&self) {
        for job in Job::ALL {
            self.scheduler.schedule(job, Duration::ZERO).await;
        }
    }

    /// Install the charger driver's enable hook
    ///
    /// The hook runs with the monitor's locks held and must not call back
    /// into the monitor.
    pub fn register_enable_charge<F>(&self, enable: F)
    where
        F: Fn(ChargerType) + Send + Sync + 'static,
    {
        self.shared.lock_charger().register_enable(Box::new(enable));
    }

    /// Install the charger driver's disable hook, same rules as the enable hook
    pub fn register_disable_charge<F>(&self, disable: F)
    where
        F: Fn(EndOfCharge) + Send + Sync + 'static,
    {
        self.shared.lock_charger().register_disable(Box::new(disable));
    }

    /// Stop the periodic jobs; charge timers keep running
    pub async fn suspend(&self) {
        info!("Suspending battery monitor");
        self.scheduler.cancel_all().await;
    }

    /// Restart the periodic jobs after [`suspend`](Self::suspend)
    ///
    /// A sleep-monitor tick during suspend has already rescheduled them.
    pub async fn resume(&self) {
        if self.shared.lock_state().ticker {
            info!("Resuming, jobs already queued by the sleep monitor");
            return;
        }
        info!("Resuming battery monitor");
        self.schedule_all_now().await;
    }

    /// Stop every job and timer
    pub async fn shutdown(&self) {
        info!("Shutting down battery monitor");
        self.scheduler.cancel_all().await;
        self.shared.lock_timers().cancel_all();
    }

    pub fn snapshot(&self) -> BatterySnapshot {
        self.shared.snapshot()
    }

    pub fn soc(&self) -> i32 {
        self.shared.lock_state().soc
    }

    pub fn status(&self) -> BatteryStatus {
        self.shared.lock_state().status
    }

    pub fn health(&self) -> BatteryHealth {
        self.shared.lock_state().health
    }

    pub fn average_voltage_adc(&self) -> i32 {
        self.shared.lock_state().average_voltage_adc()
    }

    pub fn average_temperature_adc(&self) -> i32 {
        self.shared.lock_state().average_temperature_adc()
    }

    /// Current average temperature on the platform's own ADC scale
    ///
    /// # Returns
    /// None when no platform temperature map is configured
    pub fn temperature_to_platform_adc(&self) -> Option<i32> {
        let temperature = self.shared.lock_state().average_temperature;
        temperature_to_platform_adc(&self.shared.config.temperature_map, temperature)
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.shared.config
    }

    pub fn adc(&self) -> &AdcEngine {
        &self.shared.adc
    }

    pub async fn is_scheduled(&self, job: Job) -> bool {
        self.scheduler.is_scheduled(job).await
    }

    /// Run one voltage measurement outside the schedule
    pub async fn run_voltage_cycle(&self) -> Duration {
        self.shared.run_voltage_cycle().await
    }

    /// Run one temperature measurement outside the schedule
    pub async fn run_temperature_cycle(&self) -> Duration {
        self.shared.run_temperature_cycle().await
    }
}

pub struct BatteryMonitorBuilder {
    pmic: Arc<dyn Pmic>,
    config: BatteryConfig,
    listener: Arc<dyn StatusListener>,
    enable: Option<EnableChargeFn>,
    disable: Option<DisableChargeFn>,
}

impl BatteryMonitorBuilder {
    pub fn config(mut self, config: BatteryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn enable_charge<F>(mut self, enable: F) -> Self
    where
        F: Fn(ChargerType) + Send + Sync + 'static,
    {
        self.enable = Some(Box::new(enable));
        self
    }

    pub fn disable_charge<F>(mut self, disable: F) -> Self
    where
        F: Fn(EndOfCharge) + Send + Sync + 'static,
    {
        self.disable = Some(Box::new(disable));
        self
    }

    /// Assemble the monitor; nothing runs until [`BatteryMonitor::start`]
    pub fn build(self) -> BatteryMonitor {
        let mut config = self.config;
        for e in config.validate() {
            warn!("{}", e);
        }

        let estimator = Estimator::new(&config);
        if !shared_tables_consistent() || !estimator.profile().is_consistent() {
            error!(
                "{}",
                BatteryError::CalibrationInconsistent(format!(
                    "lookup tables for {} are not monotonic",
                    estimator.profile().name
                ))
            );
        }

        let mut charger = ChargerState::default();
        if let Some(enable) = self.enable {
            charger.register_enable(enable);
        }
        if let Some(disable) = self.disable {
            charger.register_disable(disable);
        }

        let adc = AdcEngine::new(self.pmic, &config);
        let listener = self.listener;
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            config,
            estimator,
            adc,
            state: Mutex::new(BatteryState::default()),
            charger: Mutex::new(charger),
            timers: Mutex::new(ChargeTimers::new()),
            listener,
        });

        let mut scheduler = Scheduler::new();
        scheduler.register(Job::VoltageMonitor, job_body(&shared, |s| {
            async move { s.run_voltage_cycle().await }.boxed()
        }));
        scheduler.register(Job::TemperatureMonitor, job_body(&shared, |s| {
            async move { s.run_temperature_cycle().await }.boxed()
        }));
        scheduler.register(Job::StatusNotify, job_body(&shared, |s| {
            async move { s.run_status_cycle() }.boxed()
        }));

        BatteryMonitor {
            shared,
            scheduler: Arc::new(scheduler),
        }
    }
}

fn job_body<F>(shared: &Arc<Shared>, run: F) -> TaskBody
where
    F: Fn(Arc<Shared>) -> futures_util::future::BoxFuture<'static, Duration>
        + Send
        + Sync
        + 'static,
{
    let shared = Arc::clone(shared);
    Arc::new(move || run(Arc::clone(&shared)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemperatureMapPoint;
    use crate::simulator::SimulatedPmic;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingListener {
        snapshots: Mutex<Vec<BatterySnapshot>>,
        composites: Mutex<Vec<u32>>,
    }

    impl StatusListener for RecordingListener {
        fn status_changed(&self, snapshot: &BatterySnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }

        fn raw_adc_available(&self, composite: u32) {
            self.composites.lock().unwrap().push(composite);
        }
    }

    fn monitor(pmic: Arc<SimulatedPmic>, listener: Arc<RecordingListener>) -> BatteryMonitor {
        BatteryMonitor::builder(pmic)
            .listener(listener)
            .enable_charge(|_| {})
            .disable_charge(|_| {})
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_wait_for_callbacks() {
        let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new())).build();
        let intervals = monitor.config().intervals;

        assert_eq!(monitor.run_voltage_cycle().await, intervals.voltage_start);
        assert_eq!(
            monitor.run_temperature_cycle().await,
            intervals.temperature_fast
        );
        assert_eq!(monitor.average_voltage_adc(), 0);

        monitor.register_enable_charge(|_| {});
        monitor.register_disable_charge(|_| {});
        assert_eq!(monitor.run_voltage_cycle().await, intervals.voltage_settle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_voltage_sample_bootstraps() {
        let pmic = Arc::new(SimulatedPmic::new());
        let listener = Arc::new(RecordingListener::default());
        let monitor = monitor(Arc::clone(&pmic), Arc::clone(&listener));
        pmic.set_temperature_code(360);
        // 25 C seeds the average 110 codes above the raw reading
        pmic.set_voltage_code(2880);

        monitor.run_temperature_cycle().await;
        assert_eq!(monitor.snapshot().temperature, 250);

        let delay = monitor.run_voltage_cycle().await;
        assert_eq!(delay, monitor.config().intervals.voltage_settle);
        assert_eq!(monitor.soc(), 70);
        assert_eq!(listener.snapshots.lock().unwrap().len(), 1);

        let composite = *listener.composites.lock().unwrap().last().unwrap();
        assert_eq!(composite >> 12, monitor.average_voltage_adc() as u32);
        assert_eq!(composite & 0xFFF, 360);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voltage_read_failure_retries_fast() {
        let pmic = Arc::new(SimulatedPmic::new());
        let monitor = monitor(Arc::clone(&pmic), Arc::new(RecordingListener::default()));
        pmic.set_stalled(true);

        assert_eq!(
            monitor.run_voltage_cycle().await,
            monitor.config().intervals.voltage_fast
        );
        assert_eq!(monitor.average_voltage_adc(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_temperature_read_failure_retries_fast() {
        let pmic = Arc::new(SimulatedPmic::new());
        let monitor = monitor(Arc::clone(&pmic), Arc::new(RecordingListener::default()));
        pmic.set_stalled(true);

        assert_eq!(
            monitor.run_temperature_cycle().await,
            monitor.config().intervals.temperature_fast
        );
        assert_eq!(monitor.average_temperature_adc(), 0);
        assert_eq!(monitor.snapshot().temperature, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_charger_uses_fast_interval() {
        let pmic = Arc::new(SimulatedPmic::new());
        let monitor = monitor(Arc::clone(&pmic), Arc::new(RecordingListener::default()));
        monitor.handle_event(BatteryEvent::UsbAttached).await;

        assert_eq!(
            monitor.run_voltage_cycle().await,
            monitor.config().intervals.voltage_fast
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_vf_checked_only_with_charger() {
        let pmic = Arc::new(SimulatedPmic::new());
        let monitor = monitor(Arc::clone(&pmic), Arc::new(RecordingListener::default()));
        pmic.set_vf_code(0xFFF);

        monitor.run_temperature_cycle().await;
        assert!(monitor.snapshot().present);

        monitor.handle_event(BatteryEvent::TaAttached).await;
        monitor.run_temperature_cycle().await;
        assert!(!monitor.snapshot().present);

        // the factory jig suppresses the check
        pmic.set_vf_code(50);
        monitor.handle_event(BatteryEvent::JigAttached).await;
        monitor.run_temperature_cycle().await;
        assert_eq!(monitor.health(), BatteryHealth::Good);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_monitor_replicates_sample() {
        let pmic = Arc::new(SimulatedPmic::new());
        let monitor = monitor(Arc::clone(&pmic), Arc::new(RecordingListener::default()));
        pmic.set_voltage_code(3300);
        monitor.run_voltage_cycle().await;

        monitor.suspend().await;
        pmic.set_voltage_code(3200);
        monitor.handle_event(BatteryEvent::SleepMonitor).await;
        sleep(Duration::from_millis(100)).await;

        let state = monitor.shared.lock_state().clone();
        assert_eq!(state.origin_voltage_adc, 3200);
        // every slot holds the one post-wake sample
        assert_eq!(state.average_voltage_adc(), state.current_voltage_adc);
        assert!(state.average_voltage_adc() < 3520);
        assert!(!state.ticker);
        assert!(monitor.is_scheduled(Job::VoltageMonitor).await);
        monitor.shutdown().await;
        assert!(!monitor.is_scheduled(Job::VoltageMonitor).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_job_notifies_periodically() {
        let listener = Arc::new(RecordingListener::default());
        let monitor = monitor(Arc::new(SimulatedPmic::new()), Arc::clone(&listener));
        monitor.start().await;

        sleep(Duration::from_secs(125)).await;
        let notifications = listener.snapshots.lock().unwrap().len();
        // two periodic notifications plus the bootstrap one
        assert_eq!(notifications, 3);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_platform_temperature_map() {
        let mut config = BatteryConfig::default();
        let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new()))
            .config(config.clone())
            .build();
        assert_eq!(monitor.temperature_to_platform_adc(), None);

        config.temperature_map = vec![
            TemperatureMapPoint {
                temperature: -200,
                adc: 1800,
            },
            TemperatureMapPoint {
                temperature: 200,
                adc: 600,
            },
        ];
        let monitor = BatteryMonitor::builder(Arc::new(SimulatedPmic::new()))
            .config(config)
            .build();
        // average temperature starts at 0.0 C
        assert_eq!(monitor.temperature_to_platform_adc(), Some(1200));
    }
}
