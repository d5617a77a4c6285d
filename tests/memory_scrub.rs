// CLASSIFICATION: COMMUNITY
// Filename: memory_scrub.rs v0.4
// Author: Lukas Bower
// Date Modified: 2027-01-28

//! Memory-scrub controller contract: range validation against clamping,
//! mode exclusivity, and the lifecycle of the task-based modes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kestrel_psp::config::ScrubDefaults;
use kestrel_psp::hw::regmap::scrub;
use kestrel_psp::hw::{MemBlock, RegisterBlock};
use kestrel_psp::memscrub::{
    BlockReport, MemScrubController, RamSweeper, ScrubConfig, ScrubError, ScrubMode,
};

const RAM_TOP: u32 = 0x0010_0000;

/// Sweeper that counts blocks and reports one corrected error per block.
struct CountingSweeper {
    blocks: AtomicU32,
}

impl CountingSweeper {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            blocks: AtomicU32::new(0),
        })
    }
}

impl RamSweeper for CountingSweeper {
    fn scrub_block(&self, _start: u32, _len: u32) -> BlockReport {
        self.blocks.fetch_add(1, Ordering::SeqCst);
        BlockReport {
            corrected: 1,
            uncorrectable: 0,
        }
    }
}

fn defaults(mode: ScrubMode) -> ScrubDefaults {
    ScrubDefaults {
        mode,
        start_addr: 0,
        end_addr: 0x8000,
        start_on_init: false,
        block_size: 0x1000,
        timed_period_ms: 2,
    }
}

fn controller(mode: ScrubMode, sweeper: Arc<dyn RamSweeper>) -> MemScrubController<MemBlock> {
    MemScrubController::new(MemBlock::new(0x40), sweeper, &defaults(mode), RAM_TOP)
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn validate_rejects_inverted_range() {
    let ctl = controller(ScrubMode::Manual, CountingSweeper::new());
    let err = ctl
        .validate(&ScrubConfig {
            mode: ScrubMode::Manual,
            start_addr: 100,
            end_addr: 50,
        })
        .expect_err("start above end must be rejected");
    assert_eq!(
        err,
        ScrubError::BadRange {
            start: 100,
            end: 50
        }
    );
}

#[test]
fn validate_accepts_ordered_range() {
    let ctl = controller(ScrubMode::Manual, CountingSweeper::new());
    ctl.validate(&ScrubConfig {
        mode: ScrubMode::Manual,
        start_addr: 0,
        end_addr: 1000,
    })
    .expect("ordered range is valid");
}

#[test]
fn set_clamps_end_to_ram_top_instead_of_rejecting() {
    let mut ctl = controller(ScrubMode::Automatic, CountingSweeper::new());
    ctl.set(ScrubConfig {
        mode: ScrubMode::Automatic,
        start_addr: 0,
        end_addr: RAM_TOP + 1,
    })
    .expect("oversized end is clamped, not rejected");
    assert_eq!(ctl.config().end_addr, RAM_TOP);
}

#[test]
fn automatic_mode_tracks_the_hardware_enable_bit() {
    let mut ctl = controller(ScrubMode::Automatic, CountingSweeper::new());
    ctl.init().expect("automatic init");
    assert!(!ctl.is_running(), "start_on_init off leaves the engine idle");

    ctl.enable().expect("automatic enable");
    assert!(ctl.is_running());
    let config = scrub::Config::from_bits_truncate(ctl.regs().read32(scrub::CONFIG));
    assert!(config.contains(scrub::Config::SCRUBBER_ENABLE));

    ctl.disable().expect("automatic disable");
    assert!(!ctl.is_running());
    let config = scrub::Config::from_bits_truncate(ctl.regs().read32(scrub::CONFIG));
    assert!(!config.contains(scrub::Config::SCRUBBER_ENABLE));
}

#[test]
fn automatic_mode_reads_statistics_from_hardware() {
    let sweeper = CountingSweeper::new();
    let mut ctl = controller(ScrubMode::Automatic, sweeper.clone());
    ctl.init().expect("automatic init");
    // Emulate hardware counters: 3 run errors, 2 block errors, 5 CE, 1 UE.
    ctl.regs_mut().write32(scrub::STATUS, (2 << 16) | 3);
    ctl.regs_mut().write32(scrub::AHB_STATUS, (1 << 16) | 5);
    let stats = ctl.error_stats(false);
    assert_eq!(stats.run_error_count, 3);
    assert_eq!(stats.block_error_count, 2);
    assert_eq!(stats.correctable, 5);
    assert_eq!(stats.uncorrectable, 1);
    // No software task exists in automatic mode, so the sweeper was never
    // consulted.
    assert_eq!(sweeper.blocks.load(Ordering::SeqCst), 0);
}

#[test]
fn idle_mode_runs_a_background_task_until_delete() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sweeper = CountingSweeper::new();
    let mut ctl = controller(ScrubMode::Idle, sweeper.clone());
    ctl.init().expect("idle init");
    assert!(!ctl.is_running(), "task waits for enable");

    ctl.enable().expect("idle enable");
    assert!(
        wait_until(Duration::from_secs(2), || ctl.is_running()
            && sweeper.blocks.load(Ordering::SeqCst) >= 8),
        "idle task never swept"
    );
    let stats = ctl.error_stats(false);
    assert!(stats.block_error_count >= 8);
    assert!(stats.correctable >= 8);

    ctl.delete();
    assert!(!ctl.is_running(), "no task after delete");
    let swept = sweeper.blocks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        sweeper.blocks.load(Ordering::SeqCst),
        swept,
        "task kept sweeping after delete returned"
    );
    assert_eq!(ctl.error_stats(false).block_error_count, 0, "delete resets counters");
}

#[test]
fn timed_mode_sweeps_one_block_per_period() {
    let sweeper = CountingSweeper::new();
    let mut ctl = controller(ScrubMode::Timed, sweeper.clone());
    ctl.init().expect("timed init");
    ctl.enable().expect("timed enable");
    assert!(
        wait_until(Duration::from_secs(2), || sweeper
            .blocks
            .load(Ordering::SeqCst)
            >= 3),
        "timed task never woke"
    );
    ctl.disable().expect("timed disable");
    assert!(!ctl.is_running());
    ctl.delete();
}

#[test]
fn delete_then_init_resumes_with_fresh_state() {
    let sweeper = CountingSweeper::new();
    let mut ctl = controller(ScrubMode::Idle, sweeper.clone());
    ctl.init().expect("first init");
    ctl.enable().expect("first enable");
    assert!(wait_until(Duration::from_secs(2), || sweeper
        .blocks
        .load(Ordering::SeqCst)
        > 0));
    ctl.delete();
    assert_eq!(ctl.config(), ScrubConfig::INACTIVE);
    assert_eq!(ctl.enable(), Err(ScrubError::NotInitialised));

    ctl.set(ScrubConfig {
        mode: ScrubMode::Idle,
        start_addr: 0,
        end_addr: 0x2000,
    })
    .expect("reconfigure after delete");
    ctl.init().expect("re-init after delete");
    ctl.enable().expect("re-enable after delete");
    assert!(wait_until(Duration::from_secs(2), || ctl.is_running()));
    ctl.delete();
}
