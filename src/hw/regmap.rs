// CLASSIFICATION: PRIVATE
// Filename: regmap.rs · register offsets and bit fields v0.6
// Author: Lukas Bower
// Date Modified: 2026-11-02

//! Register offset maps and bit-field tables.
//!
//! One sub-module per device window.  Offsets are byte offsets from the
//! window base; multi-bit fields are `(MASK, SHIFT)` pairs used with
//! [`RegisterBlock::read_field`](super::RegisterBlock::read_field).

/// General-purpose timer bank.  A shared prescaler feeds a row of identical
/// channels; the watchdog owns one channel of this bank.
pub mod timer {
    use bitflags::bitflags;

    /// Prescaler current value.
    pub const SCALER: usize = 0x00;
    /// Prescaler reload value.
    pub const SCALER_RELOAD: usize = 0x04;
    /// Bank configuration (channel count, IRQ wiring).
    pub const CONFIG: usize = 0x08;

    /// Byte stride between channels.
    pub const CHANNEL_STRIDE: usize = 0x10;
    /// Offset of channel 0; channel `n` sits at `CHANNEL_BASE + n * CHANNEL_STRIDE`.
    pub const CHANNEL_BASE: usize = 0x10;

    /// Countdown value, relative to the channel base.
    pub const COUNTER: usize = 0x0;
    /// Reload value, relative to the channel base.
    pub const RELOAD: usize = 0x4;
    /// Control register, relative to the channel base.
    pub const CTRL: usize = 0x8;
    /// Latched counter snapshot, relative to the channel base.
    pub const LATCH: usize = 0xC;

    /// Byte offset of a named register within channel `n`.
    pub const fn channel_reg(channel: usize, reg: usize) -> usize {
        CHANNEL_BASE + channel * CHANNEL_STRIDE + reg
    }

    bitflags! {
        /// Per-channel control bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctrl: u32 {
            /// Channel counts down while set.
            const ENABLE      = 1 << 0;
            /// Reload automatically on underflow.
            const RESTART     = 1 << 1;
            /// Copy the reload register into the counter now (self-clearing
            /// on hardware).
            const LOAD        = 1 << 2;
            /// Raise the channel interrupt on underflow.
            const INT_ENABLE  = 1 << 3;
            /// Interrupt pending; write the bit to clear it.
            const INT_PENDING = 1 << 4;
            /// Chain to the previous channel's underflow.
            const CHAIN       = 1 << 5;
            /// Freeze while a debugger holds the core.
            const DEBUG_HALT  = 1 << 6;
        }
    }
}

/// Free-running 64-bit time-base counter, exposed as two 32-bit halves.
pub mod timebase {
    use bitflags::bitflags;

    /// Upper 32 bits of the counter.
    pub const COUNTER_HI: usize = 0x00;
    /// Lower 32 bits of the counter.
    pub const COUNTER_LO: usize = 0x04;
    /// Control register.
    pub const CTRL: usize = 0x08;

    bitflags! {
        /// Time-base control bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctrl: u32 {
            /// Counter runs while set.
            const ENABLE = 1 << 0;
        }
    }
}

/// Memory scrubber engine.
pub mod scrub {
    use bitflags::bitflags;

    /// AHB error status: correctable / uncorrectable totals.
    pub const AHB_STATUS: usize = 0x00;
    /// Address of the last failing AHB access.
    pub const AHB_FAILING_ADDR: usize = 0x04;
    /// AHB error interrupt configuration.
    pub const AHB_ERROR_CONFIG: usize = 0x08;
    /// Scrubber status: run / block error counts.
    pub const STATUS: usize = 0x10;
    /// Scrubber configuration.
    pub const CONFIG: usize = 0x14;
    /// First address of the scrub range.
    pub const RANGE_LOW: usize = 0x18;
    /// Last address of the scrub range.
    pub const RANGE_HIGH: usize = 0x1C;
    /// Current sweep position.
    pub const POSITION: usize = 0x20;
    /// Error-count interrupt threshold.
    pub const ERROR_THRESHOLD: usize = 0x24;
    /// Fill pattern for initialising memory.
    pub const INIT_DATA: usize = 0x28;

    /// Correctable-error total in [`AHB_STATUS`].
    pub const AHB_CE_MASK: u32 = 0x0000_FFFF;
    /// Shift for [`AHB_CE_MASK`].
    pub const AHB_CE_SHIFT: u32 = 0;
    /// Uncorrectable-error total in [`AHB_STATUS`].
    pub const AHB_UE_MASK: u32 = 0xFFFF_0000;
    /// Shift for [`AHB_UE_MASK`].
    pub const AHB_UE_SHIFT: u32 = 16;

    /// Run error count in [`STATUS`].
    pub const STATUS_RUNERR_MASK: u32 = 0x0000_FFFF;
    /// Shift for [`STATUS_RUNERR_MASK`].
    pub const STATUS_RUNERR_SHIFT: u32 = 0;
    /// Block error count in [`STATUS`].
    pub const STATUS_BLKERR_MASK: u32 = 0xFFFF_0000;
    /// Shift for [`STATUS_BLKERR_MASK`].
    pub const STATUS_BLKERR_SHIFT: u32 = 16;

    bitflags! {
        /// Scrubber configuration bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Config: u32 {
            /// Hardware sweep enabled.
            const SCRUBBER_ENABLE = 1 << 0;
            /// Restart from `RANGE_LOW` when the sweep completes.
            const LOOP_MODE       = 1 << 1;
            /// Raise an interrupt when the error threshold trips.
            const IRQ_ENABLE      = 1 << 2;
        }
    }
}

/// Board sensor block: die temperature and core voltage.
pub mod sensor {
    use bitflags::bitflags;

    /// Sensor control.
    pub const CTRL: usize = 0x00;
    /// Sensor status and temperature data.
    pub const STATUS: usize = 0x04;
    /// Core voltage data.
    pub const VOLTAGE: usize = 0x08;

    /// Raw temperature counts in [`STATUS`].
    pub const TEMP_DATA_MASK: u32 = 0x0000_7F00;
    /// Shift for [`TEMP_DATA_MASK`].
    pub const TEMP_DATA_SHIFT: u32 = 8;
    /// Core voltage in millivolts in [`VOLTAGE`].
    pub const VOLT_MV_MASK: u32 = 0x0000_FFFF;
    /// Shift for [`VOLT_MV_MASK`].
    pub const VOLT_MV_SHIFT: u32 = 0;

    bitflags! {
        /// Sensor control bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctrl: u32 {
            /// Power the sensor.
            const ENABLE = 1 << 0;
            /// Begin a conversion.
            const START  = 1 << 1;
        }
    }

    bitflags! {
        /// Sensor status bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Status: u32 {
            /// A conversion result is available.
            const READY = 1 << 0;
        }
    }
}
