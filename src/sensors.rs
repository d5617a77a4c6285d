// CLASSIFICATION: COMMUNITY
// Filename: sensors.rs v0.3
// Author: Lukas Bower
// Date Modified: 2027-01-09

//! Board sensor readout: die temperature and core voltage.
//!
//! Feeds the hardware-info collection step of startup.  A failed readout
//! degrades telemetry only; it is never allowed to block bring-up.

use log::debug;
use thiserror::Error;

use crate::hw::regmap::sensor;
use crate::hw::RegisterBlock;

/// Conversion attempts before giving up on the ready bit.
const READY_POLL_LIMIT: u32 = 1_000;

/// Raw temperature counts are offset-binary around this many millicelsius.
const TEMP_OFFSET_MC: i32 = -45_000;
/// Millicelsius per raw count.
const TEMP_STEP_MC: i32 = 1_000;

/// Errors raised by the sensor block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SensorError {
    /// The ready bit never set within the poll budget.
    #[error("sensor conversion never became ready")]
    NotReady,
    /// Snapshot requested before a successful `init`.
    #[error("sensor block not initialised")]
    NotInitialised,
}

/// One sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSnapshot {
    /// Die temperature in millicelsius.
    pub die_temp_mc: i32,
    /// Core voltage in millivolts.
    pub core_voltage_mv: u32,
}

/// The board sensor block.
pub struct BoardSensors<B: RegisterBlock> {
    regs: B,
    ready: bool,
}

impl<B: RegisterBlock> BoardSensors<B> {
    /// Wrap the sensor register window.
    pub fn new(regs: B) -> Self {
        Self { regs, ready: false }
    }

    /// Power the sensor, start a conversion and wait (bounded) for the
    /// first result.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.regs.write32(
            sensor::CTRL,
            (sensor::Ctrl::ENABLE | sensor::Ctrl::START).bits(),
        );
        for _ in 0..READY_POLL_LIMIT {
            let status = sensor::Status::from_bits_truncate(self.regs.read32(sensor::STATUS));
            if status.contains(sensor::Status::READY) {
                self.ready = true;
                debug!("sensors: first conversion ready");
                return Ok(());
            }
        }
        Err(SensorError::NotReady)
    }

    /// Read the latest conversion.
    pub fn snapshot(&self) -> Result<SensorSnapshot, SensorError> {
        if !self.ready {
            return Err(SensorError::NotInitialised);
        }
        let raw_temp = self.regs.read_field(
            sensor::STATUS,
            sensor::TEMP_DATA_MASK,
            sensor::TEMP_DATA_SHIFT,
        ) as i32;
        let voltage = self
            .regs
            .read_field(sensor::VOLTAGE, sensor::VOLT_MV_MASK, sensor::VOLT_MV_SHIFT);
        Ok(SensorSnapshot {
            die_temp_mc: raw_temp * TEMP_STEP_MC + TEMP_OFFSET_MC,
            core_voltage_mv: voltage,
        })
    }

    /// Mutably borrow the underlying register block.
    pub fn regs_mut(&mut self) -> &mut B {
        &mut self.regs
    }
}
