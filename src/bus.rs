//! Shared SPI bus to the four converters.
//!
//! Both DACs and both ADCs hang off one SPI peripheral and are addressed through
//! individual chip select lines. The two converter families need different clock
//! polarity/phase and rates, so the bus reconfigures itself whenever a transaction
//! addresses the other family than the previous one.
//!
//! Every transaction is bracketed by its own chip select: low, data phase, high.
//! Exclusive access follows from `&mut self`; partial frames of two logical
//! operations can never interleave.
use embedded_hal::{
    blocking::spi::Transfer,
    digital::v2::OutputPin,
    spi::{Mode, Phase, Polarity, MODE_1, MODE_2},
};

use crate::{Channel, Error};

/// Converter family sharing one electrical bus configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Dac,
    Adc,
}

/// Addressable device on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peripheral {
    Dac(Channel),
    Adc(Channel),
}

impl Peripheral {
    pub const ALL: [Self; 4] = [
        Self::Dac(Channel::Zero),
        Self::Dac(Channel::One),
        Self::Adc(Channel::Zero),
        Self::Adc(Channel::One),
    ];

    pub fn family(&self) -> Family {
        match self {
            Self::Dac(_) => Family::Dac,
            Self::Adc(_) => Family::Adc,
        }
    }

    /// Index of the chip select line.
    pub fn index(&self) -> usize {
        match self {
            Self::Dac(ch) => *ch as usize,
            Self::Adc(ch) => 2 + *ch as usize,
        }
    }
}

/// Electrical bus configuration for one converter family. Both families shift
/// MSB first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// SPI clock in Hz.
    pub frequency: u32,
    pub mode: Mode,
}

impl core::fmt::Debug for Profile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let polarity = match self.mode.polarity {
            Polarity::IdleLow => "IdleLow",
            Polarity::IdleHigh => "IdleHigh",
        };
        let phase = match self.mode.phase {
            Phase::CaptureOnFirstTransition => "CaptureOnFirstTransition",
            Phase::CaptureOnSecondTransition => "CaptureOnSecondTransition",
        };
        f.debug_struct("Profile")
            .field("frequency", &self.frequency)
            .field("polarity", &polarity)
            .field("phase", &phase)
            .finish()
    }
}

impl Profile {
    /// AD5752 DAC: clock idles low, data sampled on the falling edge.
    pub fn dac(frequency: u32) -> Self {
        Self {
            frequency,
            mode: MODE_1,
        }
    }

    /// AD7321 ADC: clock idles high, data latched on the falling edge.
    pub fn adc(frequency: u32) -> Self {
        Self {
            frequency,
            mode: MODE_2,
        }
    }
}

/// SPI peripheral that can switch its electrical configuration at runtime.
pub trait Reconfigure {
    type Error;

    fn reconfigure(&mut self, profile: &Profile) -> Result<(), Self::Error>;
}

/// A fixed width bus frame.
///
/// The DAC and ADC encoders share the transaction shape (one chip select bracket,
/// full duplex, MSB first) but not the word width or register layout.
pub trait Frame {
    /// Wire representation. Replaced in place by the response.
    type Word: AsMut<[u8]>;

    fn encode(&self) -> Self::Word;
}

pub struct Bus<SPI, CS> {
    spi: SPI,
    cs: [CS; 4],
    profiles: [Profile; 2],
    active: Option<Family>,
}

impl<SPI, CS> Bus<SPI, CS>
where
    SPI: Transfer<u8> + Reconfigure,
    CS: OutputPin,
{
    /// Construct the bus and deselect all converters.
    ///
    /// # Args
    /// * `spi` - SPI peripheral shared by all converters
    /// * `cs` - chip select lines, DAC0, DAC1, ADC0, ADC1 (in this order)
    /// * `dac` - bus profile for DAC transactions
    /// * `adc` - bus profile for ADC transactions
    pub fn new(spi: SPI, cs: [CS; 4], dac: Profile, adc: Profile) -> Result<Self, Error> {
        let mut bus = Bus {
            spi,
            cs,
            profiles: [dac, adc],
            active: None,
        };
        for cs in bus.cs.iter_mut() {
            cs.set_high().map_err(|_| Error::Pin)?;
        }
        Ok(bus)
    }

    /// Issue one frame to a peripheral and return the response clocked in during
    /// the same chip select bracket.
    pub fn transact<F: Frame>(&mut self, peripheral: Peripheral, frame: &F) -> Result<F::Word, Error> {
        self.configure(peripheral.family())?;
        let mut word = frame.encode();
        let cs = &mut self.cs[peripheral.index()];
        cs.set_low().map_err(|_| Error::Pin)?;
        let result = self.spi.transfer(word.as_mut()).map(|_| ()).map_err(|_| Error::Spi);
        // Release the converter even if the data phase failed.
        cs.set_high().map_err(|_| Error::Pin)?;
        result?;
        log::trace!("{:?}: {:02x?}", peripheral, word.as_mut());
        Ok(word)
    }

    fn configure(&mut self, family: Family) -> Result<(), Error> {
        if self.active != Some(family) {
            self.active = None;
            self.spi
                .reconfigure(&self.profiles[family as usize])
                .map_err(|_| Error::Spi)?;
            self.active = Some(family);
        }
        Ok(())
    }
}
