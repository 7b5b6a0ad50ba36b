//! Device context: the explicit replacement for firmware globals.
//!
//! One [`DeviceContext`] is built per wake cycle and passed by reference
//! into every component entry point.  It bundles the retained record, the
//! system clock and the watchdog; the modem is passed alongside it because
//! it owns the AT channel exclusively.

use super::ports::{ClockPort, RetainedStorage, WatchdogPort};
use crate::error::ErrorCode;
use crate::state::PersistentState;

pub struct DeviceContext<R: RetainedStorage, C: ClockPort, W: WatchdogPort> {
    pub memory: PersistentState<R>,
    pub clock: C,
    pub watchdog: W,
}

impl<R: RetainedStorage, C: ClockPort, W: WatchdogPort> DeviceContext<R, C, W> {
    pub fn new(storage: R, clock: C, watchdog: W) -> Self {
        Self {
            memory: PersistentState::new(storage),
            clock,
            watchdog,
        }
    }

    /// Record `code` with the current wall-clock time.
    pub fn log_error(&mut self, code: ErrorCode) {
        let now = self.clock.now_unix();
        self.memory.log_error(code, now);
    }

    pub fn boot_count(&self) -> u32 {
        self.memory.boot_count()
    }
}
