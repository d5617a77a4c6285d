// CLASSIFICATION: COMMUNITY
// Filename: resmem.rs v0.8
// Author: Lukas Bower
// Date Modified: 2027-01-26

//! Reserved-memory map.
//!
//! One contiguous block, fixed at link time, carved into a boot record and
//! four named sub-regions.  The carve-up happens once when the map is built
//! and never moves afterwards; everything above this module reaches the block
//! only through the bounds-checked accessors here.
//!
//! Persistence contract: the reset-persistent area and the critical data
//! store survive a processor reset; the volatile-disk area is cleared on
//! power-on reset only; the user-reserved area is scratch with no guarantee
//! across any reset.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PspConfig;

/// Byte size of the boot record at the head of the block.
pub const BOOT_RECORD_BYTES: usize = 16;

/// Kind of reset the board last went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    /// Full reset; volatile areas are cleared.
    PowerOn,
    /// Soft reset; reset-persistent areas are preserved.
    Processor,
}

impl ResetType {
    /// Wire code stored in the boot record.
    pub fn code(self) -> u32 {
        match self {
            ResetType::PowerOn => 1,
            ResetType::Processor => 2,
        }
    }

    /// Decode a boot-record wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ResetType::PowerOn),
            2 => Some(ResetType::Processor),
            _ => None,
        }
    }
}

/// Boot record: last reset type plus three reserved words.  Written once per
/// boot; the only inter-boot-cycle wire format in this package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootRecord {
    /// Wire code of the last reset type.
    pub reset_type: u32,
    /// Reserved for future use; preserved verbatim.
    pub reserved: [u32; 3],
}

impl BootRecord {
    /// Serialize to the fixed 16-byte layout (little-endian words).
    pub fn to_bytes(self) -> [u8; BOOT_RECORD_BYTES] {
        let mut out = [0u8; BOOT_RECORD_BYTES];
        out[0..4].copy_from_slice(&self.reset_type.to_le_bytes());
        for (i, word) in self.reserved.iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Deserialize from the fixed 16-byte layout.
    pub fn from_bytes(bytes: &[u8; BOOT_RECORD_BYTES]) -> Self {
        let word = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            reset_type: word(0),
            reserved: [word(1), word(2), word(3)],
        }
    }
}

/// Named sub-regions of the reserved block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryArea {
    /// Reset-persistent area.
    Reset,
    /// Critical data store.
    Cds,
    /// RAM-disk backing store.
    VolatileDisk,
    /// General-purpose scratch.
    UserReserved,
}

/// Errors raised by the reserved-memory accessors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemMapError {
    /// An accessor was asked to touch bytes past its sub-region.
    #[error("{area:?} access at offset {offset} length {length} exceeds {size}-byte region")]
    OutOfBounds {
        /// Sub-region that rejected the access.
        area: MemoryArea,
        /// Requested byte offset.
        offset: u32,
        /// Requested length.
        length: u32,
        /// Configured sub-region size.
        size: u32,
    },
    /// The provided block cannot hold the configured regions.
    #[error("configured regions need {needed} bytes, block holds {available}")]
    BlockTooSmall {
        /// Bytes the configuration requires.
        needed: usize,
        /// Bytes the block provides.
        available: usize,
    },
    /// The boot record holds a reset-type code this build does not know.
    #[error("boot record holds invalid reset type code {0}")]
    InvalidBootRecord(u32),
}

struct Region {
    offset: usize,
    size: u32,
}

/// The reserved-memory map.  Region offsets are computed once in the
/// constructor and immutable for the life of the process.
pub struct ReservedMemoryMap {
    block: Box<[u8]>,
    reset: Region,
    cds: Region,
    volatile_disk: Region,
    user_reserved: Region,
}

impl ReservedMemoryMap {
    /// Build a map over a freshly allocated block sized exactly for `cfg`.
    pub fn new(cfg: &PspConfig) -> Self {
        let block = vec![0u8; cfg.reserved_block_size()].into_boxed_slice();
        // Exact-fit allocation cannot fail the capacity check.
        Self::with_block(block, cfg).expect("exact-fit block passes its own capacity check")
    }

    /// Build a map over an existing block, e.g. the link-time reserved region
    /// or a block carried across a simulated processor reset.  Contents are
    /// left untouched; call [`initialize`](Self::initialize) to apply
    /// reset-type semantics.
    pub fn with_block(block: Box<[u8]>, cfg: &PspConfig) -> Result<Self, MemMapError> {
        let needed = cfg.reserved_block_size();
        if block.len() < needed {
            return Err(MemMapError::BlockTooSmall {
                needed,
                available: block.len(),
            });
        }
        let mut at = BOOT_RECORD_BYTES;
        let mut carve = |size: u32| {
            let region = Region { offset: at, size };
            at += size as usize;
            region
        };
        let map = Self {
            reset: carve(cfg.reset_area_size),
            cds: carve(cfg.cds_size),
            volatile_disk: carve(cfg.volatile_disk_size()),
            user_reserved: carve(cfg.user_reserved_size),
            block,
        };
        debug!(
            "reserved memory map: reset={}B cds={}B vdisk={}B user={}B",
            map.reset.size, map.cds.size, map.volatile_disk.size, map.user_reserved.size
        );
        Ok(map)
    }

    fn region(&self, area: MemoryArea) -> &Region {
        match area {
            MemoryArea::Reset => &self.reset,
            MemoryArea::Cds => &self.cds,
            MemoryArea::VolatileDisk => &self.volatile_disk,
            MemoryArea::UserReserved => &self.user_reserved,
        }
    }

    fn check(&self, area: MemoryArea, offset: u32, length: u32) -> Result<usize, MemMapError> {
        let region = self.region(area);
        let end = offset.checked_add(length);
        match end {
            Some(end) if end <= region.size => Ok(region.offset + offset as usize),
            _ => Err(MemMapError::OutOfBounds {
                area,
                offset,
                length,
                size: region.size,
            }),
        }
    }

    /// Configured size of a sub-region.
    pub fn area_size(&self, area: MemoryArea) -> u32 {
        self.region(area).size
    }

    /// Live base address and size of a sub-region.  The address is stable
    /// for the life of the map.
    pub fn area(&self, area: MemoryArea) -> (usize, u32) {
        let region = self.region(area);
        (self.block.as_ptr() as usize + region.offset, region.size)
    }

    /// Copy `data` into a sub-region at `offset`.  Rejects the whole write
    /// if any byte would land outside the region.
    pub fn write(&mut self, area: MemoryArea, offset: u32, data: &[u8]) -> Result<(), MemMapError> {
        let at = self.check(area, offset, data.len() as u32)?;
        self.block[at..at + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fill `out` from a sub-region at `offset`.  Symmetric to
    /// [`write`](Self::write).
    pub fn read(&self, area: MemoryArea, offset: u32, out: &mut [u8]) -> Result<(), MemMapError> {
        let at = self.check(area, offset, out.len() as u32)?;
        out.copy_from_slice(&self.block[at..at + out.len()]);
        Ok(())
    }

    /// Read the boot record from the head of the block.
    pub fn boot_record(&self) -> BootRecord {
        let mut raw = [0u8; BOOT_RECORD_BYTES];
        raw.copy_from_slice(&self.block[..BOOT_RECORD_BYTES]);
        BootRecord::from_bytes(&raw)
    }

    /// Write the boot record at the head of the block.
    pub fn set_boot_record(&mut self, record: BootRecord) {
        self.block[..BOOT_RECORD_BYTES].copy_from_slice(&record.to_bytes());
    }

    /// Apply reset-type semantics to the block.
    ///
    /// Power-on clears every sub-region.  Processor reset preserves them all
    /// but requires the boot record left by the previous cycle to decode; a
    /// garbage record means the "persistent" contents cannot be trusted and
    /// is unrecoverable at this stage.
    pub fn initialize(&mut self, reset: ResetType) -> Result<(), MemMapError> {
        match reset {
            ResetType::PowerOn => {
                for byte in self.block.iter_mut() {
                    *byte = 0;
                }
                info!("reserved memory cleared for power-on reset");
            }
            ResetType::Processor => {
                let record = self.boot_record();
                if ResetType::from_code(record.reset_type).is_none() {
                    return Err(MemMapError::InvalidBootRecord(record.reset_type));
                }
                info!("reserved memory preserved across processor reset");
            }
        }
        Ok(())
    }

    /// Tear the map down and hand the raw block back, preserving contents.
    /// Used to model a processor reset: rebuild with
    /// [`with_block`](Self::with_block).
    pub fn into_block(self) -> Box<[u8]> {
        self.block
    }
}
