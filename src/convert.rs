//! Conversion between physical units and converter codes.
use num_traits::float::Float;

use crate::{adc::AdcRange, Error};

// 20 V span / (3000 V/A transconductance) / 2^16
pub const MICROAMPS_PER_DAC: f32 = 0.1017;
// 20 V / 2^13 at the ±10 V range through the current sense amplifier (100 * (1 + 49.9k / 1.8k) V/A)
pub const MICROAMPS_PER_ADC: f32 = 0.85;
// 20 V / 2^16 times an output gain of 1.505
pub const MILLIVOLTS_PER_DAC: f32 = 0.4574;
// 20 V / 2^13 at the ±10 V range
pub const MILLIVOLTS_PER_ADC: f32 = 2.44;

/// A DAC sample in the AD5752 two's complement input format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DacCode(i16);

impl DacCode {
    pub const ZERO: Self = Self(0);

    /// Code for an output current in µA (current mode), compensated by the
    /// calibrated current offset code.
    pub fn from_microamps(current: f32, offset: i16) -> Result<Self, Error> {
        Self::scaled(current / MICROAMPS_PER_DAC, offset)
    }

    /// Code for an output voltage in mV (voltage mode), compensated by the
    /// calibrated voltage offset code.
    pub fn from_millivolts(voltage: f32, offset: i16) -> Result<Self, Error> {
        Self::scaled(voltage / MILLIVOLTS_PER_DAC, offset)
    }

    fn scaled(code: f32, offset: i16) -> Result<Self, Error> {
        let code = Float::round(code) + offset as f32;
        if !(i16::MIN as f32..=i16::MAX as f32).contains(&code) {
            return Err(Error::Bounds);
        }
        Ok(Self(code as i16))
    }
}

impl From<i16> for DacCode {
    fn from(code: i16) -> Self {
        Self(code)
    }
}

impl From<DacCode> for i16 {
    fn from(code: DacCode) -> i16 {
        code.0
    }
}

impl From<DacCode> for u16 {
    /// Raw register word.
    fn from(code: DacCode) -> u16 {
        code.0 as u16
    }
}

/// Convert a (possibly averaged) current sense reading into µA.
pub fn adc_to_microamps(code: f32, range: AdcRange) -> f32 {
    code * MICROAMPS_PER_ADC * range.relative_span()
}

/// Convert a (possibly averaged) voltage sense reading into mV.
pub fn adc_to_millivolts(code: f32, range: AdcRange) -> f32 {
    code * MILLIVOLTS_PER_ADC * range.relative_span()
}
