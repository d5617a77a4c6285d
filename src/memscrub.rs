// CLASSIFICATION: COMMUNITY
// Filename: memscrub.rs v0.9
// Author: Lukas Bower
// Date Modified: 2027-02-01

//! Memory-scrub controller.
//!
//! Four run modes over one sweep range:
//!
//! * `Automatic` — the hardware engine sweeps on its own; software only
//!   toggles the enable bit.
//! * `Idle` — a low-priority background task sweeps continuously.
//! * `Timed` — a background task wakes on a fixed period and sweeps one
//!   block per wake.
//! * `Manual` — no autonomous activity; the caller drives
//!   [`scrub_pass`](MemScrubController::scrub_pass) explicitly.
//!
//! The actual sweep of a block is behind [`RamSweeper`] so the controller
//! never holds a raw pointer into RAM; boards plug in a volatile-read
//! sweeper, tests plug in a recording one.
//!
//! Configuration changes are expected to be rare and serialized by the
//! caller; two tasks racing `set` against each other is undefined.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScrubDefaults;
use crate::hw::regmap::scrub;
use crate::hw::RegisterBlock;

/// Scrub run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrubMode {
    /// Hardware engine sweeps continuously.
    Automatic,
    /// Background task sweeps continuously.
    Idle,
    /// Background task sweeps one block per fixed period.
    Timed,
    /// Caller drives each pass explicitly.
    Manual,
}

/// A scrub configuration: run mode plus sweep range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrubConfig {
    /// Run mode.
    pub mode: ScrubMode,
    /// First address of the sweep range.
    pub start_addr: u32,
    /// One past the last address of the sweep range.
    pub end_addr: u32,
}

impl ScrubConfig {
    /// The zero/inactive configuration left behind by
    /// [`delete`](MemScrubController::delete).
    pub const INACTIVE: Self = Self {
        mode: ScrubMode::Manual,
        start_addr: 0,
        end_addr: 0,
    };
}

/// Byte size of the packed [`ScrubConfig`] image used by
/// [`copy_config_to`](MemScrubController::copy_config_to).
pub const SCRUB_CONFIG_BYTES: usize = 12;

/// Accumulated scrub error statistics.  All counters are monotonically
/// increasing and reset only by `delete` + `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrubStats {
    /// Current sweep position; 0 while inactive.
    pub current_position: u32,
    /// Errors observed across completed runs.
    pub run_error_count: u32,
    /// Blocks in which at least one error was observed.
    pub block_error_count: u32,
    /// Correctable errors fixed.
    pub correctable: u32,
    /// Uncorrectable errors encountered.
    pub uncorrectable: u32,
}

/// Byte size of the packed [`ScrubStats`] image used by
/// [`copy_stats_to`](MemScrubController::copy_stats_to).
pub const SCRUB_STATS_BYTES: usize = 20;

/// Errors raised by the scrub controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScrubError {
    /// A configuration's start address is not below its end address.
    #[error("scrub range start {start:#010x} is not below end {end:#010x}")]
    BadRange {
        /// Offending start address.
        start: u32,
        /// Offending end address.
        end: u32,
    },
    /// A caller buffer is too small for the requested image.
    #[error("caller buffer holds {got} bytes, {need} required")]
    BufferTooSmall {
        /// Bytes the caller provided.
        got: usize,
        /// Bytes required.
        need: usize,
    },
    /// An operation that needs an applied configuration ran before `init`.
    #[error("scrub controller not initialised")]
    NotInitialised,
    /// The selected mode does not support the operation on this board.
    #[error("operation not implemented for the current scrub mode")]
    NotImplemented,
}

/// Result of sweeping one block of RAM.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockReport {
    /// Single-bit errors corrected in the block.
    pub corrected: u32,
    /// Uncorrectable errors found in the block.
    pub uncorrectable: u32,
}

/// The seam between the controller and actual RAM.  Implementations sweep
/// `len` bytes starting at `start` (read, correct, write back) and report
/// what they found.
pub trait RamSweeper: Send + Sync {
    /// Sweep one block.
    fn scrub_block(&self, start: u32, len: u32) -> BlockReport;
}

/// Sweeper that touches nothing.  Stand-in for boards where `Automatic`
/// mode makes the software path unreachable.
pub struct NullSweeper;

impl RamSweeper for NullSweeper {
    fn scrub_block(&self, _start: u32, _len: u32) -> BlockReport {
        BlockReport::default()
    }
}

/// State shared with the background scrub task.
struct TaskShared {
    /// Task consumes blocks only while set (`enable`/`disable`).
    active: AtomicBool,
    /// One-way shutdown flag set by `delete`.
    stop: AtomicBool,
    /// Task is alive between spawn and exit.
    alive: AtomicBool,
    /// Byte offset of the next block, relative to `start_addr`.
    position: AtomicU32,
    run_errors: AtomicU32,
    block_errors: AtomicU32,
    corrected: AtomicU32,
    uncorrectable: AtomicU32,
    /// Errors seen so far in the run in progress.
    errors_this_run: AtomicU32,
}

impl TaskShared {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            position: AtomicU32::new(0),
            run_errors: AtomicU32::new(0),
            block_errors: AtomicU32::new(0),
            corrected: AtomicU32::new(0),
            uncorrectable: AtomicU32::new(0),
            errors_this_run: AtomicU32::new(0),
        }
    }

    /// Sweep the next block and roll the counters forward.
    fn step(&self, sweeper: &dyn RamSweeper, cfg: &ScrubConfig, block_size: u32) {
        let span = cfg.end_addr - cfg.start_addr;
        let pos = self.position.load(Ordering::SeqCst);
        let len = block_size.min(span - pos);
        let report = sweeper.scrub_block(cfg.start_addr + pos, len);
        let errors = report.corrected + report.uncorrectable;
        if errors > 0 {
            self.block_errors.fetch_add(1, Ordering::SeqCst);
            self.errors_this_run.fetch_add(errors, Ordering::SeqCst);
            self.corrected.fetch_add(report.corrected, Ordering::SeqCst);
            self.uncorrectable
                .fetch_add(report.uncorrectable, Ordering::SeqCst);
        }
        let next = pos + len;
        if next >= span {
            // Run complete: fold the per-run tally into the run counter.
            let run = self.errors_this_run.swap(0, Ordering::SeqCst);
            self.run_errors.fetch_add(run, Ordering::SeqCst);
            self.position.store(0, Ordering::SeqCst);
        } else {
            self.position.store(next, Ordering::SeqCst);
        }
    }
}

/// Sleep in short slices so `delete` is never held up by a long period.
fn sleep_interruptible(shared: &TaskShared, total: Duration) {
    let slice = Duration::from_millis(10);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shared.stop.load(Ordering::SeqCst) {
        let nap = remaining.min(slice);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}

/// Memory-scrub controller.
pub struct MemScrubController<B: RegisterBlock> {
    regs: B,
    sweeper: Arc<dyn RamSweeper>,
    defaults: ScrubDefaults,
    ram_top: u32,
    /// Stored configuration; applied to hardware/task on the next `init`.
    stored: ScrubConfig,
    /// Configuration in force since the last `init`, if any.
    applied: Option<ScrubConfig>,
    shared: Arc<TaskShared>,
    task: Option<JoinHandle<()>>,
}

impl<B: RegisterBlock> MemScrubController<B> {
    /// Build a controller over the scrubber register window.  `defaults`
    /// seeds the stored configuration; nothing touches hardware until
    /// [`init`](Self::init).
    pub fn new(regs: B, sweeper: Arc<dyn RamSweeper>, defaults: &ScrubDefaults, ram_top: u32) -> Self {
        Self {
            regs,
            sweeper,
            defaults: defaults.clone(),
            ram_top,
            stored: ScrubConfig {
                mode: defaults.mode,
                start_addr: defaults.start_addr,
                end_addr: defaults.end_addr.min(ram_top),
            },
            applied: None,
            shared: Arc::new(TaskShared::new()),
            task: None,
        }
    }

    /// Reject configurations whose start is not below their end.  This is
    /// the hard check only; an end address past the top of RAM is *not* an
    /// error here because [`set`](Self::set) clamps it instead.  Call
    /// `validate` before `set` when hard validation is wanted.
    pub fn validate(&self, cfg: &ScrubConfig) -> Result<(), ScrubError> {
        if cfg.start_addr >= cfg.end_addr {
            return Err(ScrubError::BadRange {
                start: cfg.start_addr,
                end: cfg.end_addr,
            });
        }
        Ok(())
    }

    /// Store a new configuration, clamping the end address to the physical
    /// top of RAM.  Takes effect on the next [`init`](Self::init), not
    /// retroactively on a running scrubber.
    pub fn set(&mut self, cfg: ScrubConfig) -> Result<(), ScrubError> {
        let clamped = ScrubConfig {
            end_addr: cfg.end_addr.min(self.ram_top),
            ..cfg
        };
        if clamped.end_addr != cfg.end_addr {
            debug!(
                "memscrub: end {:#010x} clamped to RAM top {:#010x}",
                cfg.end_addr, self.ram_top
            );
        }
        self.validate(&clamped)?;
        self.stored = clamped;
        Ok(())
    }

    /// The stored configuration.
    pub fn config(&self) -> ScrubConfig {
        self.stored
    }

    /// Copy the packed configuration image into `out`, failing if the
    /// buffer is smaller than [`SCRUB_CONFIG_BYTES`].
    pub fn copy_config_to(&self, out: &mut [u8], talkative: bool) -> Result<usize, ScrubError> {
        if out.len() < SCRUB_CONFIG_BYTES {
            return Err(ScrubError::BufferTooSmall {
                got: out.len(),
                need: SCRUB_CONFIG_BYTES,
            });
        }
        let mode = match self.stored.mode {
            ScrubMode::Automatic => 0u32,
            ScrubMode::Idle => 1,
            ScrubMode::Timed => 2,
            ScrubMode::Manual => 3,
        };
        out[0..4].copy_from_slice(&mode.to_le_bytes());
        out[4..8].copy_from_slice(&self.stored.start_addr.to_le_bytes());
        out[8..12].copy_from_slice(&self.stored.end_addr.to_le_bytes());
        if talkative {
            info!(
                "memscrub: mode {:?}, range {:#010x}..{:#010x}",
                self.stored.mode, self.stored.start_addr, self.stored.end_addr
            );
        }
        Ok(SCRUB_CONFIG_BYTES)
    }

    /// Apply the stored configuration: program the range registers, tear
    /// down any previous task, and bring the selected mode up.  Scrubbing
    /// begins immediately only when the build-time `start_on_init` flag is
    /// set; otherwise the subsystem waits for [`enable`](Self::enable).
    pub fn init(&mut self) -> Result<(), ScrubError> {
        self.validate(&self.stored)?;
        self.stop_task();
        self.regs.write32(scrub::RANGE_LOW, self.stored.start_addr);
        self.regs
            .write32(scrub::RANGE_HIGH, self.stored.end_addr.wrapping_sub(1));
        self.regs.write32(scrub::POSITION, 0);
        self.shared = Arc::new(TaskShared::new());
        self.applied = Some(self.stored);
        match self.stored.mode {
            ScrubMode::Automatic => {
                let mut bits = scrub::Config::LOOP_MODE;
                if self.defaults.start_on_init {
                    bits |= scrub::Config::SCRUBBER_ENABLE;
                }
                self.regs.write32(scrub::CONFIG, bits.bits());
            }
            ScrubMode::Idle | ScrubMode::Timed => {
                self.regs.write32(scrub::CONFIG, 0);
                self.shared
                    .active
                    .store(self.defaults.start_on_init, Ordering::SeqCst);
                self.spawn_task();
            }
            ScrubMode::Manual => {
                self.regs.write32(scrub::CONFIG, 0);
            }
        }
        info!(
            "memscrub: initialised, mode {:?}, range {:#010x}..{:#010x}, start_on_init={}",
            self.stored.mode, self.stored.start_addr, self.stored.end_addr,
            self.defaults.start_on_init
        );
        Ok(())
    }

    fn spawn_task(&mut self) {
        let shared = Arc::clone(&self.shared);
        let sweeper = Arc::clone(&self.sweeper);
        let cfg = self.stored;
        let block_size = self.defaults.block_size;
        let period = match cfg.mode {
            ScrubMode::Timed => Some(Duration::from_millis(self.defaults.timed_period_ms)),
            _ => None,
        };
        shared.alive.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("memscrub".into())
            .spawn(move || {
                debug!("memscrub task up, mode {:?}", cfg.mode);
                while !shared.stop.load(Ordering::SeqCst) {
                    match period {
                        // Timed: one block per wake while active.
                        Some(p) => {
                            sleep_interruptible(&shared, p);
                            if shared.stop.load(Ordering::SeqCst) {
                                break;
                            }
                            if shared.active.load(Ordering::SeqCst) {
                                shared.step(sweeper.as_ref(), &cfg, block_size);
                            }
                        }
                        // Idle: sweep continuously, yielding between blocks.
                        None => {
                            if shared.active.load(Ordering::SeqCst) {
                                shared.step(sweeper.as_ref(), &cfg, block_size);
                                thread::yield_now();
                            } else {
                                thread::sleep(Duration::from_millis(1));
                            }
                        }
                    }
                }
                shared.alive.store(false, Ordering::SeqCst);
                debug!("memscrub task down");
            })
            // Thread spawn only fails when the process is out of resources,
            // at which point scrubbing is the least of the board's problems.
            .unwrap_or_else(|e| panic!("memscrub task spawn failed: {e}"));
        self.task = Some(handle);
    }

    fn stop_task(&mut self) {
        if let Some(handle) = self.task.take() {
            self.shared.stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }

    /// Resume scrubbing.  `Automatic`: set the hardware enable bit.
    /// `Idle`/`Timed`: let the background task consume blocks again.
    /// `Manual`: nothing autonomous to resume.
    pub fn enable(&mut self) -> Result<(), ScrubError> {
        let applied = self.applied.ok_or(ScrubError::NotInitialised)?;
        match applied.mode {
            ScrubMode::Automatic => {
                self.regs
                    .modify32(scrub::CONFIG, 0, scrub::Config::SCRUBBER_ENABLE.bits());
            }
            ScrubMode::Idle | ScrubMode::Timed => {
                self.shared.active.store(true, Ordering::SeqCst);
            }
            ScrubMode::Manual => {
                warn!("memscrub: enable is a no-op in manual mode");
            }
        }
        Ok(())
    }

    /// Suspend scrubbing; the inverse of [`enable`](Self::enable).
    pub fn disable(&mut self) -> Result<(), ScrubError> {
        let applied = self.applied.ok_or(ScrubError::NotInitialised)?;
        match applied.mode {
            ScrubMode::Automatic => {
                self.regs
                    .modify32(scrub::CONFIG, scrub::Config::SCRUBBER_ENABLE.bits(), 0);
            }
            ScrubMode::Idle | ScrubMode::Timed => {
                self.shared.active.store(false, Ordering::SeqCst);
            }
            ScrubMode::Manual => {}
        }
        Ok(())
    }

    /// Whether scrubbing is live right now.  `Automatic` reflects the
    /// hardware enable bit; task modes require the task alive and active;
    /// `Manual` is never "running".
    pub fn is_running(&self) -> bool {
        match self.applied.map(|c| c.mode) {
            Some(ScrubMode::Automatic) => {
                scrub::Config::from_bits_truncate(self.regs.read32(scrub::CONFIG))
                    .contains(scrub::Config::SCRUBBER_ENABLE)
            }
            Some(ScrubMode::Idle) | Some(ScrubMode::Timed) => {
                self.shared.alive.load(Ordering::SeqCst)
                    && self.shared.active.load(Ordering::SeqCst)
            }
            Some(ScrubMode::Manual) | None => false,
        }
    }

    /// One full sweep of the configured range.  Only meaningful in
    /// `Manual` mode; other modes own their own sweep.
    pub fn scrub_pass(&mut self) -> Result<(), ScrubError> {
        let applied = self.applied.ok_or(ScrubError::NotInitialised)?;
        if applied.mode != ScrubMode::Manual {
            return Err(ScrubError::NotImplemented);
        }
        let block = self.defaults.block_size;
        let span = applied.end_addr - applied.start_addr;
        let mut pos = 0u32;
        while pos < span {
            self.shared.step(self.sweeper.as_ref(), &applied, block);
            pos += block.min(span - pos);
        }
        Ok(())
    }

    /// Accumulated error statistics.  `Automatic` reads the hardware
    /// counters; the task-based and manual paths report the software tally.
    pub fn error_stats(&self, talkative: bool) -> ScrubStats {
        let stats = match self.applied.map(|c| c.mode) {
            Some(ScrubMode::Automatic) => ScrubStats {
                current_position: if self.is_running() {
                    self.regs.read32(scrub::POSITION)
                } else {
                    0
                },
                run_error_count: self.regs.read_field(
                    scrub::STATUS,
                    scrub::STATUS_RUNERR_MASK,
                    scrub::STATUS_RUNERR_SHIFT,
                ),
                block_error_count: self.regs.read_field(
                    scrub::STATUS,
                    scrub::STATUS_BLKERR_MASK,
                    scrub::STATUS_BLKERR_SHIFT,
                ),
                correctable: self.regs.read_field(
                    scrub::AHB_STATUS,
                    scrub::AHB_CE_MASK,
                    scrub::AHB_CE_SHIFT,
                ),
                uncorrectable: self.regs.read_field(
                    scrub::AHB_STATUS,
                    scrub::AHB_UE_MASK,
                    scrub::AHB_UE_SHIFT,
                ),
            },
            _ => ScrubStats {
                current_position: if self.is_running() {
                    self.shared.position.load(Ordering::SeqCst)
                } else {
                    0
                },
                run_error_count: self.shared.run_errors.load(Ordering::SeqCst),
                block_error_count: self.shared.block_errors.load(Ordering::SeqCst),
                correctable: self.shared.corrected.load(Ordering::SeqCst),
                uncorrectable: self.shared.uncorrectable.load(Ordering::SeqCst),
            },
        };
        if talkative {
            info!(
                "memscrub: pos={} run_err={} blk_err={} ce={} ue={}",
                stats.current_position,
                stats.run_error_count,
                stats.block_error_count,
                stats.correctable,
                stats.uncorrectable
            );
        }
        stats
    }

    /// Copy the packed statistics image into `out`, failing if the buffer
    /// is smaller than [`SCRUB_STATS_BYTES`].
    pub fn copy_stats_to(&self, out: &mut [u8], talkative: bool) -> Result<usize, ScrubError> {
        if out.len() < SCRUB_STATS_BYTES {
            return Err(ScrubError::BufferTooSmall {
                got: out.len(),
                need: SCRUB_STATS_BYTES,
            });
        }
        let stats = self.error_stats(talkative);
        for (i, value) in [
            stats.current_position,
            stats.run_error_count,
            stats.block_error_count,
            stats.correctable,
            stats.uncorrectable,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        Ok(SCRUB_STATS_BYTES)
    }

    /// Stop everything: join any background task, clear the hardware enable,
    /// and reset the configuration to zero/inactive.  No hardware writes
    /// happen after this returns; call [`init`](Self::init) to resume.
    pub fn delete(&mut self) {
        self.stop_task();
        self.regs
            .modify32(scrub::CONFIG, scrub::Config::SCRUBBER_ENABLE.bits(), 0);
        self.stored = ScrubConfig::INACTIVE;
        self.applied = None;
        self.shared = Arc::new(TaskShared::new());
        info!("memscrub: deleted, configuration cleared");
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

impl<B: RegisterBlock> Drop for MemScrubController<B> {
    fn drop(&mut self) {
        self.stop_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MemBlock;

    /// Sweeper that injects one correctable error into every block.
    struct NoisySweeper;

    impl RamSweeper for NoisySweeper {
        fn scrub_block(&self, _start: u32, _len: u32) -> BlockReport {
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
            end_addr: 0x4000,
            start_on_init: false,
            block_size: 0x1000,
            timed_period_ms: 5,
        }
    }

    fn controller(mode: ScrubMode) -> MemScrubController<MemBlock> {
        MemScrubController::new(
            MemBlock::new(0x40),
            Arc::new(NoisySweeper),
            &defaults(mode),
            0x0800_0000,
        )
    }

    #[test]
    fn manual_pass_accumulates_block_and_run_errors() {
        let mut ctl = controller(ScrubMode::Manual);
        ctl.set(ScrubConfig {
            mode: ScrubMode::Manual,
            start_addr: 0,
            end_addr: 0x4000,
        })
        .expect("manual config accepted");
        ctl.init().expect("manual init");
        ctl.scrub_pass().expect("one manual pass");
        let stats = ctl.error_stats(false);
        // 4 blocks of 0x1000 over 0x4000, one error each.
        assert_eq!(stats.block_error_count, 4);
        assert_eq!(stats.correctable, 4);
        assert_eq!(stats.run_error_count, 4);
        assert_eq!(stats.current_position, 0);
    }

    #[test]
    fn scrub_pass_outside_manual_mode_is_not_implemented() {
        let mut ctl = controller(ScrubMode::Automatic);
        ctl.init().expect("automatic init");
        assert_eq!(ctl.scrub_pass(), Err(ScrubError::NotImplemented));
    }

    #[test]
    fn operations_before_init_report_not_initialised() {
        let mut ctl = controller(ScrubMode::Idle);
        assert_eq!(ctl.enable(), Err(ScrubError::NotInitialised));
        assert_eq!(ctl.disable(), Err(ScrubError::NotInitialised));
    }

    #[test]
    fn packed_images_reject_short_buffers() {
        let ctl = controller(ScrubMode::Manual);
        let mut short = [0u8; SCRUB_CONFIG_BYTES - 1];
        assert!(matches!(
            ctl.copy_config_to(&mut short, false),
            Err(ScrubError::BufferTooSmall { .. })
        ));
        let mut short = [0u8; SCRUB_STATS_BYTES - 1];
        assert!(matches!(
            ctl.copy_stats_to(&mut short, false),
            Err(ScrubError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn packed_config_image_round_trips_fields() {
        let mut ctl = controller(ScrubMode::Timed);
        ctl.set(ScrubConfig {
            mode: ScrubMode::Timed,
            start_addr: 0x100,
            end_addr: 0x2000,
        })
        .expect("config accepted");
        let mut buf = [0u8; SCRUB_CONFIG_BYTES];
        let n = ctl.copy_config_to(&mut buf, false).expect("image copied");
        assert_eq!(n, SCRUB_CONFIG_BYTES);
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 0x100);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 0x2000);
    }
}
