// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.7
// Author: Lukas Bower
// Date Modified: 2027-01-18

//! Build-time platform configuration.
//!
//! Every tunable the PSP consumes lives in [`PspConfig`]: reserved-memory
//! sub-region sizes, RAM-disk geometry, watchdog default timeout, scrub
//! defaults, the task priority/affinity lists and the filesystem link map.
//! Targets bake the values in via [`Default`]; host tooling and the
//! functional-test harness may load overrides from TOML instead.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memscrub::ScrubMode;
use crate::resmem::ResetType;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config file unreadable: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file is not valid TOML for this schema.
    #[error("config parse failure: {0}")]
    Parse(#[from] toml::de::Error),
    /// A cross-field consistency check failed.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// One entry of the task-priority list: tasks whose name starts with `name`
/// get `priority`.  First match wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityEntry {
    /// Task-name prefix to match.
    pub name: String,
    /// RTOS priority to assign.
    pub priority: u8,
}

/// One entry of the task-affinity list: tasks whose name starts with
/// `prefix` are pinned to `processor`.  An empty prefix matches every task
/// and acts as a catch-all default at its position in the list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffinityEntry {
    /// Task-name prefix to match; empty matches everything.
    pub prefix: String,
    /// Processor index to pin to.
    pub processor: u32,
}

/// Filesystem symbolic-link mapping applied during startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkMapping {
    /// Physical device path.
    pub physical: String,
    /// Virtual path the flight software expects.
    pub virtual_path: String,
}

/// Memory-scrub defaults applied by `MemScrubController::init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScrubDefaults {
    /// Run mode selected at build time.
    pub mode: ScrubMode,
    /// First address of the default sweep range.
    pub start_addr: u32,
    /// One past the last address of the default sweep range.
    pub end_addr: u32,
    /// Start scrubbing during `init` instead of waiting for `enable`.
    pub start_on_init: bool,
    /// Bytes swept per block in the task-based modes.
    pub block_size: u32,
    /// Wake period of the `Timed` mode task, in milliseconds.
    pub timed_period_ms: u64,
}

impl Default for ScrubDefaults {
    fn default() -> Self {
        Self {
            mode: ScrubMode::Idle,
            start_addr: 0,
            end_addr: 0x0800_0000,
            start_on_init: false,
            block_size: 0x1000,
            timed_period_ms: 250,
        }
    }
}

/// Platform Support Package configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PspConfig {
    /// Size of the reset-persistent area in bytes.
    pub reset_area_size: u32,
    /// Size of the critical data store in bytes.
    pub cds_size: u32,
    /// Size of the user-reserved scratch area in bytes.
    pub user_reserved_size: u32,
    /// RAM-disk sector size in bytes.
    pub ram_disk_sector_size: u32,
    /// Number of RAM-disk sectors.
    pub ram_disk_total_sectors: u32,
    /// Watchdog timeout applied by `WatchdogController::init`, milliseconds.
    pub watchdog_default_ms: u32,
    /// Memory-scrub defaults.
    pub scrub: ScrubDefaults,
    /// Physical end of RAM; scrub ranges are clamped to this.
    pub ram_top: u32,
    /// Ordered task-priority list.
    pub task_priorities: Vec<PriorityEntry>,
    /// Ordered task-affinity list.
    pub task_affinities: Vec<AffinityEntry>,
    /// Filesystem symbolic-link mappings.
    pub symbolic_links: Vec<LinkMapping>,
    /// Non-volatile startup file path handed to the flight core.
    pub startup_file: String,
    /// Mode identifier handed to the flight core.
    pub mode_id: u32,
    /// Reset subtype handed to the flight core.
    pub reset_subtype: u32,
    /// Force a reset type instead of probing hardware.  Boards without a
    /// usable reset-cause register set this explicitly; leaving it unset on
    /// such a board makes startup assume power-on and log the assumption.
    pub reset_type_override: Option<ResetType>,
}

impl Default for PspConfig {
    fn default() -> Self {
        Self {
            reset_area_size: 0x0003_0000,
            cds_size: 0x0002_0000,
            user_reserved_size: 0x0001_0000,
            ram_disk_sector_size: 512,
            ram_disk_total_sectors: 4096,
            watchdog_default_ms: 20_000,
            scrub: ScrubDefaults::default(),
            ram_top: 0x0800_0000,
            task_priorities: Vec::new(),
            task_affinities: Vec::new(),
            symbolic_links: Vec::new(),
            startup_file: "/cf/cfe_es_startup.scr".into(),
            mode_id: 1,
            reset_subtype: 0,
            reset_type_override: None,
        }
    }
}

impl PspConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Size of the volatile-disk area: sector size times sector count.
    pub fn volatile_disk_size(&self) -> u32 {
        self.ram_disk_sector_size
            .saturating_mul(self.ram_disk_total_sectors)
    }

    /// Total bytes the reserved-memory block must hold, boot record included.
    pub fn reserved_block_size(&self) -> usize {
        crate::resmem::BOOT_RECORD_BYTES
            + self.reset_area_size as usize
            + self.cds_size as usize
            + self.volatile_disk_size() as usize
            + self.user_reserved_size as usize
    }

    /// Cross-field consistency checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ram_disk_sector_size
            .checked_mul(self.ram_disk_total_sectors)
            .ok_or_else(|| {
                ConfigError::Inconsistent(format!(
                    "RAM disk geometry overflows: {} x {}",
                    self.ram_disk_sector_size, self.ram_disk_total_sectors
                ))
            })?;
        if self.scrub.block_size == 0 {
            return Err(ConfigError::Inconsistent(
                "scrub block size must be non-zero".into(),
            ));
        }
        if self.scrub.timed_period_ms == 0 {
            return Err(ConfigError::Inconsistent(
                "timed scrub period must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = PspConfig::default();
        cfg.validate().expect("default config validates");
        assert_eq!(cfg.volatile_disk_size(), 512 * 4096);
        assert_eq!(
            cfg.reserved_block_size(),
            16 + (0x0003_0000 + 0x0002_0000 + 0x0001_0000 + 512 * 4096) as usize
        );
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let cfg = PspConfig::from_toml_str(
            r#"
            reset_area_size = 100
            watchdog_default_ms = 5000

            [scrub]
            mode = "Timed"
            timed_period_ms = 50

            [[task_priorities]]
            name = "CFE_"
            priority = 80

            [[task_affinities]]
            prefix = ""
            processor = 0
            "#,
        )
        .expect("override config parses");
        assert_eq!(cfg.reset_area_size, 100);
        assert_eq!(cfg.cds_size, PspConfig::default().cds_size);
        assert_eq!(cfg.scrub.mode, ScrubMode::Timed);
        assert_eq!(cfg.task_priorities[0].priority, 80);
        assert_eq!(cfg.task_affinities[0].prefix, "");
    }

    #[test]
    fn zero_scrub_block_size_is_rejected() {
        let err = PspConfig::from_toml_str("[scrub]\nblock_size = 0\n")
            .expect_err("zero block size must fail validation");
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }
}
