/// Channel reads in auto and manual conversion modes
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Duration};

use super::{
    AdcChannel, AdcMode, Pmic, ADC_CHANNEL_COUNT, ADC_MAX_CODE, GPID3_REG, GPID4_REG, GPID5_REG,
    GPID6_REG,
};
use crate::config::BatteryConfig;
use crate::error::{BatteryError, Result};

const VF_READS: u32 = 4;
const VF_READS_SHIFT: u32 = 2;

/// End-of-conversion results handed from the PMIC interrupt to the reader
///
/// One slot per channel. [`complete`](AdcCompletion::complete) stores the
/// code and wakes every waiter; a waiter only returns once its own channel's
/// slot is filled.
#[derive(Debug, Default)]
pub struct AdcCompletion {
    notify: Notify,
    results: Mutex<[Option<u16>; ADC_CHANNEL_COUNT]>,
}

impl AdcCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished conversion, called from the PMIC side
    pub fn complete(&self, channel: AdcChannel, code: u16) {
        {
            let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
            results[channel.index()] = Some(code & ADC_MAX_CODE);
        }
        self.notify.notify_waiters();
    }

    fn clear(&self, channel: AdcChannel) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results[channel.index()] = None;
    }

    fn take(&self, channel: AdcChannel) -> Option<u16> {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results[channel.index()].take()
    }

    async fn wait(&self, channel: AdcChannel) -> u16 {
        loop {
            // Register interest before checking so a completion in between is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(code) = self.take(channel) {
                return code;
            }
            notified.await;
        }
    }
}

/// Calibration readings the bootloader left in the general-purpose registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub voltage_adc: Option<i32>,
    pub temperature_adc: Option<i32>,
}

/// Serialized access to the PMIC's ADC
pub struct AdcEngine {
    pmic: Arc<dyn Pmic>,
    mode: Mutex<AdcMode>,
    completion: Arc<AdcCompletion>,
    // Held across the whole select/convert/extract sequence
    lock: tokio::sync::Mutex<()>,
    settle: Duration,
    poll_interval: Duration,
    poll_retries: u32,
}

impl AdcEngine {
    pub fn new(pmic: Arc<dyn Pmic>, config: &BatteryConfig) -> Self {
        let completion = Arc::new(AdcCompletion::new());
        pmic.bind_completion(Arc::clone(&completion));

        Self {
            pmic,
            mode: Mutex::new(config.adc_mode),
            completion,
            lock: tokio::sync::Mutex::new(()),
            settle: config.adc_settle,
            poll_interval: config.adc_poll_interval,
            poll_retries: config.adc_poll_retries,
        }
    }

    pub fn pmic(&self) -> &Arc<dyn Pmic> {
        &self.pmic
    }

    pub fn completion(&self) -> Arc<AdcCompletion> {
        Arc::clone(&self.completion)
    }

    pub fn mode(&self) -> AdcMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch conversion strategy; a no-op when already in `mode`
    pub fn set_mode(&self, mode: AdcMode) {
        let mut current = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == mode {
            warn!("ADC mode is already {}", mode);
            return;
        }
        info!("ADC mode changed from {} to {}", *current, mode);
        *current = mode;
    }

    /// Read one 12-bit code from `channel`
    ///
    /// # Returns
    /// The masked code, `InvalidArgument` for a channel the current mode cannot
    /// convert, or `IoTimeout` when the conversion never completed
    pub async fn read_channel(&self, channel: AdcChannel) -> Result<u16> {
        let mode = self.mode();
        let _guard = self.lock.lock().await;

        match mode {
            AdcMode::Auto => self.read_auto(channel).await,
            AdcMode::Manual => self.read_manual(channel).await,
        }
    }

    async fn read_auto(&self, channel: AdcChannel) -> Result<u16> {
        if channel == AdcChannel::Tjunc {
            return Err(BatteryError::InvalidArgument(format!(
                "channel {:?} is not available in auto mode",
                channel
            )));
        }

        self.pmic.arm_adc_channel(channel, AdcMode::Auto)?;
        sleep(self.settle).await;
        let polled = self.pmic.poll_adc_result(channel);
        // Always give the channel back, even when the poll failed
        let released = self.pmic.release_adc(channel);

        let (code, done) = polled?;
        released?;
        if !done {
            return Err(BatteryError::IoTimeout(format!(
                "auto conversion on {:?} did not finish",
                channel
            )));
        }
        Ok(code & ADC_MAX_CODE)
    }

    async fn read_manual(&self, channel: AdcChannel) -> Result<u16> {
        if channel == AdcChannel::Ain {
            return Err(BatteryError::InvalidArgument(format!(
                "channel {:?} is not available in manual mode",
                channel
            )));
        }

        self.completion.clear(channel);
        self.pmic.arm_adc_channel(channel, AdcMode::Manual)?;

        let budget = self.poll_interval * self.poll_retries.max(1);
        match timeout(budget, self.completion.wait(channel)).await {
            Ok(code) => Ok(code),
            Err(_) => {
                warn!(
                    "Manual ADC conversion on {:?} timed out after {:?}",
                    channel, budget
                );
                Err(BatteryError::IoTimeout(format!(
                    "manual conversion on {:?} did not complete",
                    channel
                )))
            }
        }
    }

    /// Average of four consecutive VF conversions
    pub async fn read_vf(&self) -> Result<u16> {
        let mut sum: u32 = 0;
        for _ in 0..VF_READS {
            sum += u32::from(self.read_channel(AdcChannel::Vf).await?);
        }
        let vf = (sum >> VF_READS_SHIFT) as u16;
        debug!("VF ADC average {}", vf);
        Ok(vf)
    }

    /// Read the voltage and temperature codes persisted by the bootloader
    ///
    /// A register pair of zero means nothing was stored.
    pub fn read_calibration(&self) -> Result<Calibration> {
        let temp_msb = self.pmic.read_register(GPID5_REG)?;
        let temp_lsb = self.pmic.read_register(GPID6_REG)?;
        let volt_msb = self.pmic.read_register(GPID4_REG)?;
        let volt_lsb = self.pmic.read_register(GPID3_REG)?;

        Ok(Calibration {
            voltage_adc: twelve_bit(volt_msb, volt_lsb),
            temperature_adc: twelve_bit(temp_msb, temp_lsb),
        })
    }
}

fn twelve_bit(msb: u8, lsb: u8) -> Option<i32> {
    if msb == 0 && lsb == 0 {
        None
    } else {
        Some((i32::from(msb & 0x0F) << 8) | i32::from(lsb))
    }
}
