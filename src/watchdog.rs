// CLASSIFICATION: COMMUNITY
// Filename: watchdog.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-12-09

//! Watchdog controller.
//!
//! One channel of the general-purpose timer bank wired as a deadman timer:
//! once enabled, the hardware forces a board reset unless
//! [`service`](WatchdogController::service) reloads the countdown before it
//! reaches zero.  That reset is the mechanism of last resort for a hung
//! system and is deliberately not catchable in software, so none of these
//! operations return errors; correctness rests on the caller respecting the
//! documented bounds and servicing on time.

use log::debug;

use crate::hw::regmap::timer::{self, Ctrl};
use crate::hw::RegisterBlock;

/// Smallest accepted timeout, milliseconds.
pub const WATCHDOG_MIN_MS: u32 = 1;
/// Largest accepted timeout, milliseconds.
pub const WATCHDOG_MAX_MS: u32 = 300_000;
/// Hardware ticks per millisecond at the prescaler setting `init` applies.
pub const WATCHDOG_TICKS_PER_MS: u32 = 1_000;

/// Prescaler reload giving [`WATCHDOG_TICKS_PER_MS`] from the board clock.
const SCALER_RELOAD_VALUE: u32 = 249;

/// Deadman timer over one hardware timer channel.
pub struct WatchdogController<B: RegisterBlock> {
    regs: B,
    channel: usize,
    default_ms: u32,
    timeout_ms: u32,
    enabled: bool,
}

impl<B: RegisterBlock> WatchdogController<B> {
    /// Wrap `channel` of the timer bank behind `regs`.  Hardware is not
    /// touched until [`init`](Self::init).
    pub fn new(regs: B, channel: usize, default_ms: u32) -> Self {
        let default_ms = default_ms.clamp(WATCHDOG_MIN_MS, WATCHDOG_MAX_MS);
        Self {
            regs,
            channel,
            default_ms,
            timeout_ms: default_ms,
            enabled: false,
        }
    }

    fn reg(&self, reg: usize) -> usize {
        timer::channel_reg(self.channel, reg)
    }

    /// Configure the prescaler and reload for the default timeout and leave
    /// the channel disabled.
    ///
    /// Quirk, kept on purpose: re-running `init` after a [`set`](Self::set)
    /// reverts the timeout to the build-time default rather than preserving
    /// the set value.
    pub fn init(&mut self) {
        self.regs.write32(timer::SCALER_RELOAD, SCALER_RELOAD_VALUE);
        self.regs.write32(timer::SCALER, SCALER_RELOAD_VALUE);
        self.regs.write32(
            self.reg(timer::RELOAD),
            self.default_ms.saturating_mul(WATCHDOG_TICKS_PER_MS),
        );
        self.regs.write32(self.reg(timer::CTRL), 0);
        self.timeout_ms = self.default_ms;
        self.enabled = false;
        debug!(
            "watchdog: channel {} initialised, timeout {} ms, disabled",
            self.channel, self.timeout_ms
        );
    }

    /// Arm the timer: clear any pending interrupt, then set the enable and
    /// interrupt-enable bits.  Clearing first avoids an immediate spurious
    /// fire from a stale pending bit.
    pub fn enable(&mut self) {
        let ctrl = self.reg(timer::CTRL);
        self.regs.modify32(ctrl, Ctrl::INT_PENDING.bits(), 0);
        self.regs
            .modify32(ctrl, 0, (Ctrl::ENABLE | Ctrl::INT_ENABLE).bits());
        self.enabled = true;
        debug!("watchdog: enabled, timeout {} ms", self.timeout_ms);
    }

    /// Disarm the timer.  Only the enable bit is cleared; the configured
    /// reload survives.
    pub fn disable(&mut self) {
        self.regs
            .modify32(self.reg(timer::CTRL), Ctrl::ENABLE.bits(), 0);
        self.enabled = false;
        debug!("watchdog: disabled");
    }

    /// Reload the countdown from the configured reload value without
    /// disturbing the enable bits.  Must be called at an interval strictly
    /// shorter than the configured timeout while the timer is armed.
    pub fn service(&mut self) {
        self.regs
            .modify32(self.reg(timer::CTRL), 0, Ctrl::LOAD.bits());
    }

    /// Last configured timeout in milliseconds.  Software-tracked, not
    /// re-read from hardware.
    pub fn get(&self) -> u32 {
        self.timeout_ms
    }

    /// Set the timeout.  Requests are clamped to
    /// `[WATCHDOG_MIN_MS, WATCHDOG_MAX_MS]`, converted to hardware ticks and
    /// applied immediately via the load bit.  (Earlier board support left
    /// the new value latent until the next `service`; this controller
    /// applies it at once.)
    pub fn set(&mut self, ms: u32) {
        let clamped = ms.clamp(WATCHDOG_MIN_MS, WATCHDOG_MAX_MS);
        if clamped != ms {
            debug!("watchdog: requested {} ms clamped to {} ms", ms, clamped);
        }
        self.regs.write32(
            self.reg(timer::RELOAD),
            clamped.saturating_mul(WATCHDOG_TICKS_PER_MS),
        );
        self.regs
            .modify32(self.reg(timer::CTRL), 0, Ctrl::LOAD.bits());
        self.timeout_ms = clamped;
    }

    /// Software-tracked armed state.  Also dumps the raw channel registers
    /// at debug level; the dump is advisory, not part of the contract.
    pub fn status(&self) -> bool {
        debug!(
            "watchdog: counter={:#010x} reload={:#010x} ctrl={:#010x}",
            self.regs.read32(self.reg(timer::COUNTER)),
            self.regs.read32(self.reg(timer::RELOAD)),
            self.regs.read32(self.reg(timer::CTRL)),
        );
        self.enabled
    }

    /// Borrow the underlying register block.
    pub fn regs(&self) -> &B {
        &self.regs
    }

    /// Mutably borrow the underlying register block.
    pub fn regs_mut(&mut self) -> &mut B {
        &mut self.regs
    }
}
