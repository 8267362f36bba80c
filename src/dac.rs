//! Stimulus DAC driver
//!
//! Each channel is driven by its own AD5752 DAC (only DAC A is used). The DACs
//! share the converter SPI bus and are addressed by their "sync" chip selects.
//! Written values sit in the input register until the channel's LDAC line is
//! pulsed low, which allows both channels to be updated simultaneously.
//!
//! DAC datasheet: https://www.analog.com/media/en/technical-documentation/data-sheets/AD5722_5732_5752.pdf
use arbitrary_int::u3;
use bitbybit::bitfield;
use embedded_hal::{
    blocking::{delay::DelayUs, spi::Transfer},
    digital::v2::OutputPin,
};

use crate::{
    bus::{Bus, Frame, Peripheral, Reconfigure},
    convert::DacCode,
    Channel, Error,
};

// DAC Register Addresses
#[allow(unused)]
#[derive(Clone, Copy, Debug)]
enum Register {
    Dac = 0b000,
    OutputRange = 0b001,
    PowerControl = 0b010,
    Control = 0b011,
}

// Output range register: ±10 V span.
const RANGE_BIPOLAR_10V: u16 = 0b100;
// Power control register: DAC A powered up.
const POWER_UP_A: u16 = 1 << 0;
// Address of the only DAC used on each device.
const DAC_A: u8 = 0b000;
// Power up time before the DAC may be loaded.
const POWER_UP_DELAY_US: u16 = 10;

/// 24 bit input shift register frame, MSB first.
#[bitfield(u32)]
pub struct DacFrame {
    #[bit(23, rw)]
    read: bool,
    #[bits(19..=21, rw)]
    register: u3,
    #[bits(16..=18, rw)]
    address: u3,
    #[bits(0..=15, rw)]
    data: u16,
}

impl DacFrame {
    fn write(register: Register, data: u16) -> Self {
        Self::new_with_raw_value(0)
            .with_read(false)
            .with_register(u3::new(register as u8))
            .with_address(u3::new(DAC_A))
            .with_data(data)
    }
}

impl Frame for DacFrame {
    type Word = [u8; 3];

    fn encode(&self) -> [u8; 3] {
        let [_, a, b, c] = self.raw_value().to_be_bytes();
        [a, b, c]
    }
}

pub mod sm {
    smlang::statemachine! {
        transitions: {
            *Unpowered + PowerUp = Ready,
            Ready + PowerUp = Ready,
            Ready + Update = Ready,
        }
    }
}

pub struct Lifecycle;

impl sm::StateMachineContext for Lifecycle {}

/// DAC driver holding the LDAC lines. Bus transactions borrow the shared bus.
pub struct Dac<P> {
    latch: [P; 2],
    sm: sm::StateMachine<Lifecycle>,
}

impl<P: OutputPin> Dac<P> {
    /// Construct a new DAC driver for both output channels.
    ///
    /// # Args
    /// * `latch` - LDAC lines of channel 0 and 1 (active low)
    pub fn new(mut latch: [P; 2]) -> Result<Self, Error> {
        for l in latch.iter_mut() {
            l.set_high().map_err(|_| Error::Pin)?;
        }
        Ok(Dac {
            latch,
            sm: sm::StateMachine::new(Lifecycle),
        })
    }

    /// Configure the output span of both DACs and power them up.
    pub fn setup<SPI, CS>(
        &mut self,
        bus: &mut Bus<SPI, CS>,
        delay: &mut impl DelayUs<u16>,
    ) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        for ch in Channel::ALL {
            // The first write may be ignored due to the undefined power-up state.
            self.set_output_span(bus, ch)?;
            self.set_output_span(bus, ch)?;
            bus.transact(
                Peripheral::Dac(ch),
                &DacFrame::write(Register::PowerControl, POWER_UP_A),
            )?;
            delay.delay_us(POWER_UP_DELAY_US);
        }
        self.sm
            .process_event(sm::Events::PowerUp)
            .map_err(|_| Error::NotPowered)?;
        log::info!("DACs powered up, ±10 V span");
        Ok(())
    }

    /// Select the ±10 V output span. Narrower spans are not used.
    pub fn set_output_span<SPI, CS>(&mut self, bus: &mut Bus<SPI, CS>, ch: Channel) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        bus.transact(
            Peripheral::Dac(ch),
            &DacFrame::write(Register::OutputRange, RANGE_BIPOLAR_10V),
        )?;
        Ok(())
    }

    /// Load and latch a new output code on a single channel.
    pub fn write<SPI, CS>(&mut self, bus: &mut Bus<SPI, CS>, ch: Channel, code: DacCode) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        self.update()?;
        bus.transact(Peripheral::Dac(ch), &DacFrame::write(Register::Dac, code.into()))?;
        let latch = &mut self.latch[ch as usize];
        latch.set_low().map_err(|_| Error::Pin)?;
        latch.set_high().map_err(|_| Error::Pin)
    }

    /// Load both channels, then latch them with one common LDAC pulse.
    pub fn write_both<SPI, CS>(&mut self, bus: &mut Bus<SPI, CS>, codes: [DacCode; 2]) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
    {
        self.update()?;
        for (ch, code) in Channel::ALL.into_iter().zip(codes) {
            bus.transact(Peripheral::Dac(ch), &DacFrame::write(Register::Dac, code.into()))?;
        }
        for l in self.latch.iter_mut() {
            l.set_low().map_err(|_| Error::Pin)?;
        }
        for l in self.latch.iter_mut() {
            l.set_high().map_err(|_| Error::Pin)?;
        }
        Ok(())
    }

    fn update(&mut self) -> Result<(), Error> {
        self.sm
            .process_event(sm::Events::Update)
            .map(|_| ())
            .map_err(|_| Error::NotPowered)
    }
}
