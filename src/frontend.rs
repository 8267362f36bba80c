//! Two channel stimulus front end
//!
//! Owns the shared converter bus, both DACs and ADCs, the output stages and the
//! settling delay. This is the operational API used by stimulus sequencing.
use embedded_hal::{
    blocking::{delay::DelayUs, spi::Transfer},
    digital::v2::OutputPin,
};

use crate::{
    adc::{Adc, AdcRange, InputLine},
    bus::{Bus, Reconfigure},
    calibration::{CalibrationState, Calibrator},
    convert::{adc_to_microamps, adc_to_millivolts, DacCode},
    dac::Dac,
    output::{OutputMode, OutputStage},
    statistics::{Buffer, Statistics},
    Channel, Error,
};

pub struct Frontend<SPI, CS, P, D> {
    bus: Bus<SPI, CS>,
    dac: Dac<P>,
    adc: Adc,
    output: OutputStage<P>,
    delay: D,
}

impl<SPI, CS, P, D> Frontend<SPI, CS, P, D>
where
    SPI: Transfer<u8> + Reconfigure,
    CS: OutputPin,
    P: OutputPin,
    D: DelayUs<u16>,
{
    pub fn new(bus: Bus<SPI, CS>, dac: Dac<P>, output: OutputStage<P>, delay: D) -> Self {
        Self {
            bus,
            dac,
            adc: Adc::new(),
            output,
            delay,
        }
    }

    /// Ground both outputs, power up the DACs at zero and select the ±10 V ADC range.
    pub fn setup(&mut self) -> Result<(), Error> {
        for ch in Channel::ALL {
            self.output.set_mode(ch, OutputMode::Ground)?;
        }
        self.dac.setup(&mut self.bus, &mut self.delay)?;
        self.dac.write_both(&mut self.bus, [DacCode::ZERO; 2])?;
        self.adc.set_range(&mut self.bus, AdcRange::Bipolar10V)
    }

    /// Bring up the converters and run the startup calibration.
    ///
    /// Afterwards both outputs are grounded, carrying their calibrated offset codes,
    /// and the ADC is at the ±10 V range.
    pub fn initialize(&mut self, calibrator: &mut Calibrator) -> Result<(), Error> {
        self.setup()?;
        calibrator.run(self)?;
        log::info!("Front end ready");
        Ok(())
    }

    pub fn set_output_mode(&mut self, ch: Channel, mode: OutputMode) -> Result<(), Error> {
        self.output.set_mode(ch, mode)
    }

    pub fn output_mode(&self, ch: Channel) -> Option<OutputMode> {
        self.output.mode(ch)
    }

    /// Update a single channel. Not synchronized with the other channel.
    pub fn write_amplitude(&mut self, ch: Channel, code: DacCode) -> Result<(), Error> {
        self.dac.write(&mut self.bus, ch, code)
    }

    /// Update both channels within the same latch event.
    pub fn write_amplitudes(&mut self, code0: DacCode, code1: DacCode) -> Result<(), Error> {
        self.dac.write_both(&mut self.bus, [code0, code1])
    }

    pub fn set_adc_range(&mut self, range: AdcRange) -> Result<(), Error> {
        self.adc.set_range(&mut self.bus, range)
    }

    pub fn adc_range(&self) -> Option<AdcRange> {
        self.adc.range()
    }

    /// Read one decoded conversion of the given input.
    pub fn read_adc(&mut self, ch: Channel, line: InputLine) -> Result<i32, Error> {
        self.adc.read_sample(&mut self.bus, ch, line)
    }

    /// Blocking analog settling wait.
    pub fn settle(&mut self, us: u16) {
        self.delay.delay_us(us);
    }

    /// Average readings of an input and convert to physical units.
    ///
    /// The zero error of the active range is subtracted. Returns µA for the
    /// current sense line and mV for the voltage sense line.
    pub fn measure(
        &mut self,
        state: &CalibrationState,
        ch: Channel,
        line: InputLine,
        samples: u16,
    ) -> Result<f32, Error> {
        // Power-on default of the range register.
        let range = self.adc.range().unwrap_or(AdcRange::Bipolar10V);
        let mut buff = Buffer::default();
        for _ in 0..samples.max(1) {
            buff.update(self.read_adc(ch, line)?);
        }
        let mean = Option::<Statistics>::from(buff).map_or(0.0, |s| s.mean);
        let code = mean - state.adc_zero_error(range, ch);
        Ok(match line {
            InputLine::Current => adc_to_microamps(code, range),
            InputLine::Voltage => adc_to_millivolts(code, range),
        })
    }
}
