// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.5
// Author: Lukas Bower
// Date Modified: 2027-02-03

//! Platform Support Package core for the Kestrel flight computers.
//!
//! Bridges the portable flight-software core to the board: reset handling
//! and reserved memory, the hardware watchdog, the memory scrubber, the
//! monotonic time base and the startup sequence that wires them together
//! before handing control to the flight core.

/// Build-time platform configuration.
pub mod config;

/// Hardware register model (register blocks, offset maps, bit fields).
pub mod hw;

/// Memory-scrub controller and run modes.
pub mod memscrub;

/// Reserved-memory map: boot record and the four sub-regions.
pub mod resmem;

/// Board temperature/voltage readout.
pub mod sensors;

/// Startup sequencer and task priority/affinity policies.
pub mod startup;

/// Free-running 64-bit time base.
pub mod timebase;

/// NTP/time synchronisation boundary.
pub mod timesync;

/// Watchdog (deadman) timer controller.
pub mod watchdog;
