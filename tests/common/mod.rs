// CLASSIFICATION: COMMUNITY
// Filename: mod.rs · test support v0.2
// Author: Lukas Bower
// Date Modified: 2027-01-15

//! Shared test support: a software model of the watchdog channel's
//! countdown so deadline behaviour can be exercised without hardware.

use kestrel_psp::hw::regmap::timer::{self, Ctrl};
use kestrel_psp::hw::RegisterBlock;
use kestrel_psp::watchdog::WATCHDOG_TICKS_PER_MS;

/// Steps a timer channel the way the hardware would: consume a pending
/// load bit, count down while enabled, and record a fire on underflow.
#[derive(Default)]
pub struct WatchdogSim {
    /// Set once the countdown underflows with the channel enabled; on real
    /// hardware this is the uncontrolled board reset.
    pub fired: bool,
}

impl WatchdogSim {
    /// Advance the channel by `ms` milliseconds of simulated time.
    pub fn advance<B: RegisterBlock>(&mut self, regs: &mut B, channel: usize, ms: u32) {
        let ctrl_off = timer::channel_reg(channel, timer::CTRL);
        let counter_off = timer::channel_reg(channel, timer::COUNTER);
        let reload_off = timer::channel_reg(channel, timer::RELOAD);

        let mut ctrl = Ctrl::from_bits_truncate(regs.read32(ctrl_off));
        // The load bit is self-clearing on hardware.
        if ctrl.contains(Ctrl::LOAD) {
            let reload = regs.read32(reload_off);
            regs.write32(counter_off, reload);
            ctrl.remove(Ctrl::LOAD);
            regs.write32(ctrl_off, ctrl.bits());
        }
        if !ctrl.contains(Ctrl::ENABLE) {
            return;
        }
        let elapsed = u64::from(ms) * u64::from(WATCHDOG_TICKS_PER_MS);
        let counter = u64::from(regs.read32(counter_off));
        if elapsed >= counter {
            self.fired = true;
            regs.write32(counter_off, 0);
            regs.modify32(ctrl_off, 0, Ctrl::INT_PENDING.bits());
        } else {
            regs.write32(counter_off, (counter - elapsed) as u32);
        }
    }
}
