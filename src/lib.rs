#![cfg_attr(not(test), no_std)]

#[cfg(target_os = "none")]
pub mod hardware;

pub mod adc;
pub mod bus;
pub mod calibration;
pub mod convert;
pub mod dac;
pub mod frontend;
pub mod output;
pub mod settings;
pub mod statistics;

#[cfg(test)]
mod sim;

/// Front end channel. Each channel owns one DAC, one ADC and one output stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Zero = 0,
    One = 1,
}

impl Channel {
    pub const ALL: [Self; 2] = [Self::Zero, Self::One];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// SPI transfer or reconfiguration failed.
    Spi,
    /// A chip select, latch or output enable line could not be driven.
    Pin,
    /// Amplitude write before the DAC was powered up.
    NotPowered,
    /// Physical amplitude outside of the DAC code range.
    Bounds,
}
