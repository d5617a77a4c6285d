// CLASSIFICATION: COMMUNITY
// Filename: watchdog_timer.rs v0.3
// Author: Lukas Bower
// Date Modified: 2027-01-15

//! Watchdog controller contract: clamping, enable/disable idempotence, and
//! deadline behaviour against the simulated countdown.

mod common;

use common::WatchdogSim;
use kestrel_psp::hw::MemBlock;
use kestrel_psp::watchdog::{WatchdogController, WATCHDOG_MAX_MS, WATCHDOG_MIN_MS};

const CHANNEL: usize = 3;

fn controller(default_ms: u32) -> WatchdogController<MemBlock> {
    let mut wd = WatchdogController::new(MemBlock::new(0x100), CHANNEL, default_ms);
    wd.init();
    wd
}

#[test]
fn set_clamps_below_minimum() {
    let mut wd = controller(20_000);
    wd.set(0);
    assert_eq!(wd.get(), WATCHDOG_MIN_MS);
}

#[test]
fn set_clamps_above_maximum() {
    let mut wd = controller(20_000);
    wd.set(WATCHDOG_MAX_MS + 1);
    assert_eq!(wd.get(), WATCHDOG_MAX_MS);
}

#[test]
fn set_keeps_in_range_values_exact() {
    let mut wd = controller(20_000);
    wd.set(1_234);
    assert_eq!(wd.get(), 1_234);
}

#[test]
fn enable_twice_stays_enabled() {
    let mut wd = controller(20_000);
    wd.enable();
    wd.enable();
    assert!(wd.status());
}

#[test]
fn disable_twice_stays_disabled() {
    let mut wd = controller(20_000);
    wd.enable();
    wd.disable();
    wd.disable();
    assert!(!wd.status());
}

#[test]
fn servicing_faster_than_timeout_survives_twenty_rounds() {
    let mut wd = controller(20_000);
    let mut sim = WatchdogSim::default();
    wd.set(1_000);
    wd.enable();
    let mut completed = 0;
    for _ in 0..20 {
        wd.service();
        sim.advance(wd.regs_mut(), CHANNEL, 900);
        assert!(!sim.fired, "watchdog fired despite 900 ms service period");
        completed += 1;
    }
    wd.disable();
    assert_eq!(completed, 20);
}

#[test]
fn missed_deadline_fires_the_hardware() {
    let mut wd = controller(20_000);
    let mut sim = WatchdogSim::default();
    wd.set(100);
    wd.enable();
    wd.service();
    sim.advance(wd.regs_mut(), CHANNEL, 150);
    assert!(sim.fired, "watchdog must fire once the timeout lapses");
}

#[test]
fn disabled_watchdog_never_fires() {
    let mut wd = controller(20_000);
    let mut sim = WatchdogSim::default();
    wd.set(100);
    wd.enable();
    wd.disable();
    sim.advance(wd.regs_mut(), CHANNEL, 10_000);
    assert!(!sim.fired);
}
