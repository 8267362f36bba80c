//! Front end settings.
//!
//! Every field is a miniconf leaf and can be addressed by path, e.g.
//! `/calibration/voltage_offsets`.
use miniconf::{Leaf, Tree};
use serde::Serialize;

use crate::bus::Profile;

#[derive(Clone, Copy, Debug, Tree, Serialize)]
pub struct BusSettings {
    /// DAC SPI clock in Hz. The AD5752 is specified up to 30 MHz but 20 MHz already
    /// fails across the digital isolators.
    pub dac_frequency: Leaf<u32>,
    /// ADC SPI clock in Hz.
    pub adc_frequency: Leaf<u32>,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            dac_frequency: Leaf(10_000_000),
            adc_frequency: Leaf(5_000_000),
        }
    }
}

impl BusSettings {
    /// DAC and ADC bus profiles.
    pub fn profiles(&self) -> (Profile, Profile) {
        (Profile::dac(*self.dac_frequency), Profile::adc(*self.adc_frequency))
    }
}

#[derive(Clone, Copy, Debug, Tree, Serialize)]
pub struct CalibrationSettings {
    /// Run the voltage offset sweep during initialization.
    ///
    /// # Note
    /// Anything connected to the outputs sees a voltage ramp while this runs.
    pub voltage_offsets: Leaf<bool>,

    /// First DAC code of the offset sweep.
    pub window_start: Leaf<i16>,

    /// End of the offset sweep window (exclusive).
    pub window_end: Leaf<i16>,

    /// ADC readings per channel and trial code.
    pub samples: Leaf<u16>,

    /// Settling time after each current sweep step in µs.
    pub current_settle: Leaf<u16>,

    /// Settling time after each voltage sweep step in µs.
    pub voltage_settle: Leaf<u16>,

    /// Readings per channel taken for the ADC zero error, including the discarded
    /// settling transient.
    pub zero_error_burst: Leaf<u16>,

    /// Leading readings of the zero error burst that are discarded.
    pub zero_error_discard: Leaf<u16>,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            voltage_offsets: Leaf(false),
            window_start: Leaf(-100),
            window_end: Leaf(100),
            samples: Leaf(100),
            current_settle: Leaf(50),
            voltage_settle: Leaf(30),
            zero_error_burst: Leaf(150),
            zero_error_discard: Leaf(50),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Tree, Serialize)]
pub struct Settings {
    pub bus: BusSettings,
    pub calibration: CalibrationSettings,
}
