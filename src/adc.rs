// Sense ADC driver (AD7321 https://www.analog.com/media/en/technical-documentation/data-sheets/AD7321.pdf)
//
// One two-input ADC per channel: Vin0 senses the output voltage, Vin1 the output
// current. A conversion is clocked out on every chip select bracket. The mux
// setting written in a frame only applies from the following frame on, so the
// frame carrying a mux change returns a conversion of the previous input.

use bitbybit::bitenum;
use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};

use crate::{
    bus::{Bus, Frame, Peripheral, Reconfigure},
    Channel, Error,
};

// *Note*: Register bitfields are not exhaustive.
const WRITE: u16 = 1 << 15;
const REG_CONTROL: u16 = 0b00 << 13;
const REG_RANGE: u16 = 0b01 << 13;
// Control register
const ADD0_SHIFT: u16 = 10; // input select, Vin0 / Vin1
const REF_INTERNAL: u16 = 1 << 4; // internal reference enable
// Range register
const VIN0_RANGE_SHIFT: u16 = 11;
const VIN1_RANGE_SHIFT: u16 = 7;
// Conversion result
const CHANNEL_ID: u16 = 1 << 13;
const DATA_MASK: u16 = 0x1fff;
const DATA_SIGN: i32 = 1 << 12;

/// ADC input selection.
#[derive(Debug, PartialEq, Eq)]
#[bitenum(u1, exhaustive = true)]
pub enum InputLine {
    /// Output voltage sense (Vin0)
    Voltage = 0,
    /// Current sense amplifier (Vin1)
    Current = 1,
}

/// Bipolar input range. Written identically for both inputs of both ADCs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum AdcRange {
    Bipolar10V = 0b00,
    Bipolar5V = 0b01,
    Bipolar2V5 = 0b10,
}

impl AdcRange {
    /// Span relative to the ±10 V range.
    pub fn relative_span(&self) -> f32 {
        match self {
            Self::Bipolar10V => 1.0,
            Self::Bipolar5V => 0.5,
            Self::Bipolar2V5 => 0.25,
        }
    }
}

/// 16 bit ADC frame. Every frame returns a conversion result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdcFrame(u16);

impl AdcFrame {
    /// No register write, only clock out a conversion.
    pub const READ: Self = Self(0);

    pub fn control(line: InputLine) -> Self {
        let add0 = u16::from(line.raw_value().value()) << ADD0_SHIFT;
        Self(WRITE | REG_CONTROL | add0 | REF_INTERNAL)
    }

    pub fn range(range: AdcRange) -> Self {
        let bits = range as u16;
        Self(WRITE | REG_RANGE | bits << VIN0_RANGE_SHIFT | bits << VIN1_RANGE_SHIFT)
    }
}

impl Frame for AdcFrame {
    type Word = [u8; 2];

    fn encode(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

/// Decode a conversion result into a signed code centered at the ADC's zero.
///
/// The channel identifier bit is stripped and the 13 bit two's complement
/// result is sign extended. The result always lies within [-4096, 4095].
pub fn decode(word: [u8; 2], line: InputLine) -> i32 {
    let word = u16::from_be_bytes(word);
    let id = u8::from(word & CHANNEL_ID != 0);
    if id != line.raw_value().value() {
        log::debug!("conversion from {} while reading {:?}", id, line);
    }
    let data = i32::from(word & DATA_MASK);
    if data >= DATA_SIGN {
        data - (DATA_SIGN << 1)
    } else {
        data
    }
}

/// ADC driver state. Tracks the mux setting of each ADC so that mode switches
/// are only issued when needed.
#[derive(Debug, Default)]
pub struct Adc {
    selected: [Option<InputLine>; 2],
    range: Option<AdcRange>,
}

impl Adc {
    /// Input selection is unknown until the first control register write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the ADC input of a channel.
    ///
    /// The conversion clocked out with the control word reflects the previous
    /// input and is discarded.
    pub fn select_input_line<SPI, CS>(
        &mut self,
        bus: &mut Bus<SPI, CS>,
        ch: Channel,
        line: InputLine,
    ) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        bus.transact(Peripheral::Adc(ch), &AdcFrame::control(line))?;
        self.selected[ch as usize] = Some(line);
        Ok(())
    }

    /// Set the input range of both ADCs.
    pub fn set_range<SPI, CS>(&mut self, bus: &mut Bus<SPI, CS>, range: AdcRange) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        for ch in Channel::ALL {
            bus.transact(Peripheral::Adc(ch), &AdcFrame::range(range))?;
        }
        self.range = Some(range);
        log::debug!("ADC range {}", range.as_ref());
        Ok(())
    }

    /// Read one conversion of the given input.
    ///
    /// If the input differs from the tracked mux setting, the mux is switched first
    /// and the stale conversion returned by that frame is dropped.
    pub fn read_sample<SPI, CS>(
        &mut self,
        bus: &mut Bus<SPI, CS>,
        ch: Channel,
        line: InputLine,
    ) -> Result<i32, Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        if self.selected[ch as usize] != Some(line) {
            self.select_input_line(bus, ch, line)?;
        }
        let word = bus.transact(Peripheral::Adc(ch), &AdcFrame::READ)?;
        Ok(decode(word, line))
    }

    pub fn selected(&self, ch: Channel) -> Option<InputLine> {
        self.selected[ch as usize]
    }

    pub fn range(&self) -> Option<AdcRange> {
        self.range
    }
}
