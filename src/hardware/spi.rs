//! Converter SPI peripheral with runtime switchable bus profile.
//!
//! The HAL fixes mode and clock at construction. Switching between the DAC and
//! ADC profiles releases the peripheral and brings it up again with the new
//! configuration; the pins stay in their alternate function.
use super::hal::{
    hal::blocking::spi::Transfer,
    prelude::*,
    rcc::CoreClocks,
    spi::{self, Enabled, Spi},
    stm32::SPI1,
    time::Hertz,
};

use crate::bus::{Profile, Reconfigure};

#[derive(Debug)]
pub enum Error {
    Bus(spi::Error),
    /// The peripheral was lost in a failed reconfiguration.
    Released,
}

impl From<spi::Error> for Error {
    fn from(e: spi::Error) -> Self {
        Self::Bus(e)
    }
}

pub struct ConverterSpi {
    spi: Option<Spi<SPI1, Enabled, u8>>,
    clocks: CoreClocks,
}

impl ConverterSpi {
    /// # Args
    /// * `spi` - SPI1, configured for `profile`
    /// * `clocks` - core clocks, used to derive the SPI clock on reconfiguration
    pub fn new(spi: Spi<SPI1, Enabled, u8>, clocks: CoreClocks) -> Self {
        Self {
            spi: Some(spi),
            clocks,
        }
    }
}

impl Reconfigure for ConverterSpi {
    type Error = Error;

    fn reconfigure(&mut self, profile: &Profile) -> Result<(), Error> {
        let (regs, rec) = self.spi.take().ok_or(Error::Released)?.free();
        let spi: Spi<SPI1, Enabled, u8> = regs.spi_unchecked(
            profile.mode,
            Hertz::from_raw(profile.frequency),
            rec,
            &self.clocks,
        );
        self.spi = Some(spi);
        Ok(())
    }
}

impl Transfer<u8> for ConverterSpi {
    type Error = Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Error> {
        let spi = self.spi.as_mut().ok_or(Error::Released)?;
        Ok(spi.transfer(words)?)
    }
}
