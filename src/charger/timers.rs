/// One-shot charge and recharge-check timers
///
/// Each armed timer is a tokio task holding a weak reference back to the
/// monitor. A fired timer only acts if it is still the one recorded in its
/// slot, so a timer that was cancelled or re-armed in the meantime is ignored.
use log::{info, warn};
use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::models::ChargeTimerKind;
use crate::monitor::Shared;

const HOUR_SECS: u64 = 3600;
pub const RECHARGE_CHECK_DELAY: Duration = Duration::from_secs(30);
pub const RESTART_CHARGE_DURATION: Duration = Duration::from_secs(90 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Bounds the length of a charge
    Charge,
    /// Re-evaluates a timed-out charge shortly after it stopped
    Recharge,
}

#[derive(Debug)]
struct TimerSlot {
    id: u64,
    handle: JoinHandle<()>,
}

/// The two timer slots the charge state machine owns
#[derive(Debug, Default)]
pub struct ChargeTimers {
    charge: Option<TimerSlot>,
    recharge: Option<TimerSlot>,
    next_id: u64,
}

impl ChargeTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerSlot> {
        match kind {
            TimerKind::Charge => &mut self.charge,
            TimerKind::Recharge => &mut self.recharge,
        }
    }

    /// Start `kind`, replacing a pending one
    pub(crate) fn arm(&mut self, kind: TimerKind, duration: Duration, shared: Weak<Shared>) {
        self.cancel(kind);

        self.next_id += 1;
        let id = self.next_id;
        let handle = tokio::spawn(async move {
            sleep(duration).await;
            if let Some(shared) = shared.upgrade() {
                shared.on_timer_fired(kind, id);
            }
        });

        info!("{:?} timer armed for {:?}", kind, duration);
        *self.slot(kind) = Some(TimerSlot { id, handle });
    }

    /// Stop `kind` if it has not fired yet
    ///
    /// # Returns
    /// true when a pending timer was cancelled
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Charge);
        self.cancel(TimerKind::Recharge);
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Charge => self.charge.is_some(),
            TimerKind::Recharge => self.recharge.is_some(),
        }
    }

    /// Claim the slot for a timer that just fired
    ///
    /// # Returns
    /// false when the timer was superseded and must do nothing
    pub(crate) fn claim_fired(&mut self, kind: TimerKind, id: u64) -> bool {
        let current = matches!(self.slot(kind), Some(slot) if slot.id == id);
        if current {
            // The task is finishing on its own, so it is not aborted
            *self.slot(kind) = None;
        }
        current
    }
}

impl Drop for ChargeTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// How long a charge may run before the timer declares it full
///
/// # Arguments
/// * `capacity_mah` - rated battery capacity
/// * `kind` - fresh start or restart after full
pub fn charge_timer_duration(capacity_mah: u32, kind: ChargeTimerKind) -> Duration {
    let hours = match kind {
        ChargeTimerKind::Restart => return RESTART_CHARGE_DURATION,
        ChargeTimerKind::Start => match capacity_mah {
            0..=1499 => 5,
            1500..=1999 => 6,
            2000..=4499 => 8,
            4500..=6999 => 10,
            _ => {
                warn!("Unexpected battery capacity {} mAh", capacity_mah);
                5
            }
        },
    };
    Duration::from_secs(hours * HOUR_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_duration_by_capacity() {
        let hours = |c| charge_timer_duration(c, ChargeTimerKind::Start).as_secs() / HOUR_SECS;
        assert_eq!(hours(1300), 5);
        assert_eq!(hours(1500), 6);
        assert_eq!(hours(2600), 8);
        assert_eq!(hours(5000), 10);
        assert_eq!(hours(8000), 5);
        assert_eq!(
            charge_timer_duration(1500, ChargeTimerKind::Restart),
            Duration::from_secs(5400)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_claim() {
        let mut timers = ChargeTimers::new();
        assert!(!timers.cancel(TimerKind::Charge));

        timers.arm(TimerKind::Charge, Duration::from_secs(10), Weak::new());
        assert!(timers.is_pending(TimerKind::Charge));
        assert!(!timers.is_pending(TimerKind::Recharge));

        // a stale id does not claim the slot
        assert!(!timers.claim_fired(TimerKind::Charge, 0));
        assert!(timers.claim_fired(TimerKind::Charge, 1));
        assert!(!timers.is_pending(TimerKind::Charge));

        timers.arm(TimerKind::Recharge, RECHARGE_CHECK_DELAY, Weak::new());
        assert!(timers.cancel(TimerKind::Recharge));
        assert!(!timers.is_pending(TimerKind::Recharge));
    }
}
