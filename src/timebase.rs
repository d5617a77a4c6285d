// CLASSIFICATION: COMMUNITY
// Filename: timebase.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-11-30

//! Time-base service.
//!
//! A free-running 64-bit hardware counter read as two 32-bit halves; the
//! system's monotonic time base.  Reads are rollover-safe via the classic
//! hi/lo/hi double read.

use log::info;

use crate::hw::regmap::timebase::{Ctrl, COUNTER_HI, COUNTER_LO, CTRL};
use crate::hw::RegisterBlock;

/// Default counter rate, ticks per second.
pub const DEFAULT_TICKS_PER_SECOND: u32 = 1_000_000;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Free-running 64-bit time base.
pub struct TimeBase<B: RegisterBlock> {
    regs: B,
    ticks_per_second: u32,
    initialised: bool,
}

impl<B: RegisterBlock> TimeBase<B> {
    /// Wrap the time-base register window.  The counter is not started
    /// until [`init`](Self::init).
    pub fn new(regs: B, ticks_per_second: u32) -> Self {
        Self {
            regs,
            ticks_per_second,
            initialised: false,
        }
    }

    /// Start the counter.  Idempotent: a second call logs a notice and
    /// leaves the running counter untouched.
    pub fn init(&mut self) {
        if self.initialised {
            info!("timebase: already initialised, leaving counter running");
            return;
        }
        self.regs.write32(CTRL, Ctrl::ENABLE.bits());
        self.initialised = true;
        info!("timebase: running at {} ticks/s", self.ticks_per_second);
    }

    /// Whether [`init`](Self::init) has run.
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Current 64-bit tick count.  Rollover-safe: the upper half is read
    /// before and after the lower half and the read retried if it moved.
    pub fn ticks(&self) -> u64 {
        loop {
            let hi = self.regs.read32(COUNTER_HI);
            let lo = self.regs.read32(COUNTER_LO);
            if self.regs.read32(COUNTER_HI) == hi {
                return (u64::from(hi) << 32) | u64::from(lo);
            }
        }
    }

    /// Convert a tick count to whole seconds plus microseconds.
    pub fn ticks_to_time(&self, ticks: u64) -> (u64, u32) {
        let rate = u64::from(self.ticks_per_second);
        let secs = ticks / rate;
        let micros = (ticks % rate) * MICROS_PER_SECOND / rate;
        (secs, micros as u32)
    }

    /// Counter rate in ticks per second.
    pub fn tick_rate(&self) -> u32 {
        self.ticks_per_second
    }

    /// Seconds until the 64-bit counter wraps, counted from zero.
    pub fn rollover_seconds(&self) -> u64 {
        u64::MAX / u64::from(self.ticks_per_second)
    }

    /// Mutably borrow the underlying register block.
    pub fn regs_mut(&mut self) -> &mut B {
        &mut self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MemBlock;

    fn timebase() -> TimeBase<MemBlock> {
        TimeBase::new(MemBlock::new(0x10), DEFAULT_TICKS_PER_SECOND)
    }

    #[test]
    fn init_starts_counter_and_is_idempotent() {
        let mut tb = timebase();
        tb.init();
        assert!(tb.is_initialised());
        tb.regs_mut().write32(COUNTER_LO, 1234);
        tb.init();
        assert_eq!(tb.regs_mut().read32(COUNTER_LO), 1234);
    }

    #[test]
    fn ticks_combine_both_halves() {
        let mut tb = timebase();
        tb.regs_mut().write32(COUNTER_HI, 0x2);
        tb.regs_mut().write32(COUNTER_LO, 0x0000_0042);
        assert_eq!(tb.ticks(), 0x2_0000_0042);
    }

    #[test]
    fn tick_conversion_splits_seconds_and_micros() {
        let tb = timebase();
        let (secs, micros) = tb.ticks_to_time(3 * 1_000_000 + 250_000);
        assert_eq!(secs, 3);
        assert_eq!(micros, 250_000);
    }

    #[test]
    fn rollover_horizon_matches_rate() {
        let tb = timebase();
        assert_eq!(tb.rollover_seconds(), u64::MAX / 1_000_000);
    }
}
