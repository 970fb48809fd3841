//! Blocking delays backed by the host scheduler.
//!
//! Everything timing-related in this crate goes through [DelayNs], so the same driver code can be
//! run against real hardware with [StdDelay] or against the simulated bus with
//! [SimDelay](crate::sim::SimDelay).
use embedded_hal::delay::DelayNs;
use std::thread::sleep;
use std::time::Duration;

/// Delay that puts the current thread to sleep.
///
/// The kernel may oversleep, which is fine: every delay used by the drivers is a minimum.
#[derive(Debug, Default, Copy, Clone)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        sleep(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms.into()));
    }
}
