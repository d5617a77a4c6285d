// CLASSIFICATION: PRIVATE
// Filename: mod.rs · hardware register model v0.4
// Author: Lukas Bower
// Date Modified: 2026-10-14

//! Hardware register model.
//!
//! Every device this package touches (timer bank, watchdog channel, memory
//! scrubber engine, board sensor block) is a small window of 32-bit registers
//! at a fixed physical base.  [`RegisterBlock`] abstracts that window as a
//! byte-offset-addressed region so the controllers above it never hold raw
//! pointers themselves: production code hands them an [`MmioBlock`] over the
//! real device, tests hand them a [`MemBlock`] over plain memory.
//!
//! Register offsets and bit-field tables live in [`regmap`].

#![allow(unsafe_code)]

pub mod regmap;

/// A window of 32-bit device registers addressed by byte offset.
///
/// Offsets must be word-aligned and inside the window; violating either is a
/// programming error and panics rather than touching a neighbouring device.
pub trait RegisterBlock: Send {
    /// Size of the window in bytes.
    fn len(&self) -> usize;

    /// True when the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the 32-bit register at `offset`.
    fn read32(&self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset`.
    fn write32(&mut self, offset: usize, value: u32);

    /// Read-modify-write: clear the bits in `clear`, then set the bits in
    /// `set`.
    fn modify32(&mut self, offset: usize, clear: u32, set: u32) {
        let v = self.read32(offset);
        self.write32(offset, (v & !clear) | set);
    }

    /// Extract a multi-bit field described by `(mask, shift)`.
    fn read_field(&self, offset: usize, mask: u32, shift: u32) -> u32 {
        (self.read32(offset) & mask) >> shift
    }

    /// Replace a multi-bit field described by `(mask, shift)`.
    fn write_field(&mut self, offset: usize, mask: u32, shift: u32, value: u32) {
        let v = self.read32(offset);
        self.write32(offset, (v & !mask) | ((value << shift) & mask));
    }
}

fn check_offset(offset: usize, len: usize) {
    assert!(offset % 4 == 0, "register offset {offset:#x} not word-aligned");
    assert!(
        offset + 4 <= len,
        "register offset {offset:#x} outside {len:#x}-byte block"
    );
}

/// Volatile access to a memory-mapped register block at a fixed physical
/// base.  Production backend; constructed once per device during bring-up.
pub struct MmioBlock {
    base: *mut u32,
    len: usize,
}

// One owner per device window; the raw pointer is to device memory, not to
// anything the allocator tracks.
unsafe impl Send for MmioBlock {}

impl MmioBlock {
    /// Map `len` bytes of device registers at physical address `base`.
    ///
    /// # Safety
    /// `base..base+len` must be a valid, uncached device mapping for the
    /// whole life of the block, and no other `MmioBlock` may cover it.
    pub unsafe fn new(base: usize, len: usize) -> Self {
        Self {
            base: base as *mut u32,
            len,
        }
    }
}

impl RegisterBlock for MmioBlock {
    fn len(&self) -> usize {
        self.len
    }

    fn read32(&self, offset: usize) -> u32 {
        check_offset(offset, self.len);
        unsafe { core::ptr::read_volatile(self.base.add(offset / 4)) }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        check_offset(offset, self.len);
        unsafe { core::ptr::write_volatile(self.base.add(offset / 4), value) }
    }
}

/// Plain in-memory register window.  Test backend; also usable as a staging
/// image for registers that are latched out in one burst.
#[derive(Debug, Clone)]
pub struct MemBlock {
    words: Vec<u32>,
}

impl MemBlock {
    /// Create a zeroed window of `len` bytes (rounded up to a whole word).
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(4)],
        }
    }
}

impl RegisterBlock for MemBlock {
    fn len(&self) -> usize {
        self.words.len() * 4
    }

    fn read32(&self, offset: usize) -> u32 {
        check_offset(offset, self.len());
        self.words[offset / 4]
    }

    fn write32(&mut self, offset: usize, value: u32) {
        check_offset(offset, self.len());
        self.words[offset / 4] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_block_round_trips_words() {
        let mut block = MemBlock::new(16);
        block.write32(8, 0xDEAD_BEEF);
        assert_eq!(block.read32(8), 0xDEAD_BEEF);
        assert_eq!(block.read32(12), 0);
    }

    #[test]
    fn modify_clears_then_sets() {
        let mut block = MemBlock::new(8);
        block.write32(0, 0b1111);
        block.modify32(0, 0b0110, 0b1000_0000);
        assert_eq!(block.read32(0), 0b1000_1001);
    }

    #[test]
    fn field_access_masks_and_shifts() {
        let mut block = MemBlock::new(8);
        block.write_field(4, 0x0000_FF00, 8, 0x42);
        assert_eq!(block.read32(4), 0x4200);
        assert_eq!(block.read_field(4, 0x0000_FF00, 8), 0x42);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_window_read_panics() {
        let block = MemBlock::new(8);
        block.read32(8);
    }

    #[test]
    #[should_panic(expected = "not word-aligned")]
    fn unaligned_read_panics() {
        let block = MemBlock::new(8);
        block.read32(2);
    }
}
