//! Offset calibration
//!
//! The ADC bipolar zero error is measured with both outputs grounded. The DAC
//! codes that null the residual output current (grounded load) and output
//! voltage (voltage drive) are then found by an exhaustive scan over a small
//! window of codes, both channels moving together.
use embedded_hal::{
    blocking::{delay::DelayUs, spi::Transfer},
    digital::v2::OutputPin,
};
use num_traits::float::Float;
use serde::Serialize;

use crate::{
    adc::{AdcRange, InputLine},
    bus::Reconfigure,
    convert::DacCode,
    frontend::Frontend,
    output::OutputMode,
    settings::CalibrationSettings,
    statistics::{Buffer, Statistics},
    Channel, Error,
};

/// Ranges at which the ADC zero error is measured. The last one is left active.
const ZERO_ERROR_RANGES: [AdcRange; 2] = [AdcRange::Bipolar2V5, AdcRange::Bipolar10V];
/// Range used for the offset sweeps.
const SWEEP_RANGE: AdcRange = AdcRange::Bipolar2V5;
/// Range restored after each sweep.
const OPERATING_RANGE: AdcRange = AdcRange::Bipolar10V;

/// Calibration results. Zero until the corresponding procedure has run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CalibrationState {
    /// ADC zero error in counts, `[range][channel]`.
    adc_zero_error: [[f32; 2]; 3],
    current_offset: [i16; 2],
    voltage_offset: [i16; 2],
}

impl CalibrationState {
    /// ADC zero error in counts. Zero for ranges that were not measured.
    pub fn adc_zero_error(&self, range: AdcRange, ch: Channel) -> f32 {
        self.adc_zero_error[range as usize][ch as usize]
    }

    /// DAC code for zero output current into a grounded load.
    pub fn current_offset(&self, ch: Channel) -> i16 {
        self.current_offset[ch as usize]
    }

    /// DAC code for zero output voltage.
    pub fn voltage_offset(&self, ch: Channel) -> i16 {
        self.voltage_offset[ch as usize]
    }
}

/// Quantity nulled by an offset sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetTarget {
    /// Grounded output, current sense.
    Current,
    /// Voltage drive, voltage sense. Ramps the output voltage.
    Voltage,
}

impl OffsetTarget {
    fn mode(&self) -> OutputMode {
        match self {
            Self::Current => OutputMode::Ground,
            Self::Voltage => OutputMode::Voltage,
        }
    }

    fn line(&self) -> InputLine {
        match self {
            Self::Current => InputLine::Current,
            Self::Voltage => InputLine::Voltage,
        }
    }
}

/// A trial residual must be smaller than this to count as a null.
const NULL_THRESHOLD: f32 = 10_000.0;

/// Per channel minimum tracking over ascending trial codes.
///
/// A trial replaces the best one only if its residual is strictly smaller, so
/// ties keep the lower code. Channels without any trial below
/// [`NULL_THRESHOLD`] keep their previous code.
#[derive(Clone, Copy, Debug)]
struct Sweep {
    codes: [i16; 2],
    residuals: [f32; 2],
}

impl Sweep {
    fn new(previous: [i16; 2]) -> Self {
        Self {
            codes: previous,
            residuals: [NULL_THRESHOLD; 2],
        }
    }

    fn update(&mut self, code: i16, residuals: [f32; 2]) {
        let best = self.codes.iter_mut().zip(self.residuals.iter_mut());
        for ((best_code, best_residual), residual) in best.zip(residuals) {
            let residual = Float::abs(residual);
            if residual < *best_residual {
                *best_code = code;
                *best_residual = residual;
            }
        }
    }

    fn nulled(&self, ch: Channel) -> bool {
        self.residuals[ch as usize] < NULL_THRESHOLD
    }
}

/// Runs the calibration procedures and owns their results.
pub struct Calibrator {
    settings: CalibrationSettings,
    state: CalibrationState,
}

impl Calibrator {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            state: CalibrationState::default(),
        }
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Startup calibration: ADC zero error, current offsets and, if enabled in the
    /// settings, voltage offsets.
    pub fn run<SPI, CS, P, D>(&mut self, fe: &mut Frontend<SPI, CS, P, D>) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        self.measure_adc_zero_error(fe)?;
        self.calibrate_current_offsets(fe)?;
        if *self.settings.voltage_offsets {
            self.calibrate_voltage_offsets(fe)?;
        } else {
            log::info!("Voltage offset calibration disabled");
        }
        Ok(())
    }

    /// Measure the ADC zero error of both channels at the ±2.5 V and ±10 V ranges.
    ///
    /// Both outputs are grounded and the voltage sense line is sampled. The ADC is
    /// left at the ±10 V range.
    pub fn measure_adc_zero_error<SPI, CS, P, D>(
        &mut self,
        fe: &mut Frontend<SPI, CS, P, D>,
    ) -> Result<(), Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        for ch in Channel::ALL {
            fe.set_output_mode(ch, OutputMode::Ground)?;
        }
        for range in ZERO_ERROR_RANGES {
            fe.set_adc_range(range)?;
            let mut buff = [Buffer::default(); 2];
            for i in 0..*self.settings.zero_error_burst {
                for ch in Channel::ALL {
                    let code = fe.read_adc(ch, InputLine::Voltage)?;
                    if i >= *self.settings.zero_error_discard {
                        buff[ch as usize].update(code);
                    }
                }
            }
            for ch in Channel::ALL {
                let stats: Option<Statistics> = buff[ch as usize].into();
                let error = match stats {
                    Some(s) => {
                        log::info!(
                            "{:?} ADC zero error at {}: {} (ptp {}, std {})",
                            ch,
                            range.as_ref(),
                            s.mean,
                            s.ptp,
                            s.std
                        );
                        s.mean
                    }
                    None => {
                        log::warn!("Empty zero error burst, assuming no error");
                        0.0
                    }
                };
                self.state.adc_zero_error[range as usize][ch as usize] = error;
            }
        }
        Ok(())
    }

    /// Find and apply the DAC codes nulling the output current into a grounded load.
    pub fn calibrate_current_offsets<SPI, CS, P, D>(
        &mut self,
        fe: &mut Frontend<SPI, CS, P, D>,
    ) -> Result<[i16; 2], Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        let codes = self.find_best_offset_code(fe, OffsetTarget::Current)?;
        self.state.current_offset = codes;
        Ok(codes)
    }

    /// Find and apply the DAC codes nulling the output voltage.
    ///
    /// # Note
    /// This drives a voltage ramp onto the outputs. Both channels are grounded
    /// afterwards, also if the sweep fails.
    pub fn calibrate_voltage_offsets<SPI, CS, P, D>(
        &mut self,
        fe: &mut Frontend<SPI, CS, P, D>,
    ) -> Result<[i16; 2], Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        let codes = self.find_best_offset_code(fe, OffsetTarget::Voltage)?;
        self.state.voltage_offset = codes;
        Ok(codes)
    }

    /// Scan the calibration window and return the code minimizing the summed,
    /// zero error corrected reading of each channel.
    ///
    /// The best codes are written to the DACs. Whether or not the scan succeeds,
    /// the ADC is returned to the ±10 V range and, after a voltage scan, both
    /// outputs are grounded. A current scan leaves them grounded anyway.
    pub fn find_best_offset_code<SPI, CS, P, D>(
        &self,
        fe: &mut Frontend<SPI, CS, P, D>,
        target: OffsetTarget,
    ) -> Result<[i16; 2], Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        let swept = self.sweep(fe, target);
        let grounded = match target {
            OffsetTarget::Voltage => Channel::ALL
                .into_iter()
                .try_for_each(|ch| fe.set_output_mode(ch, OutputMode::Ground)),
            OffsetTarget::Current => Ok(()),
        };
        let ranged = fe.set_adc_range(OPERATING_RANGE);
        let sweep = swept?;
        grounded?;
        ranged?;

        for ch in Channel::ALL {
            if !sweep.nulled(ch) {
                log::warn!(
                    "{:?} {:?} offset: no null in window, keeping code {}",
                    ch,
                    target,
                    sweep.codes[ch as usize]
                );
            }
        }
        log::info!(
            "{:?} offset codes {:?}, residuals {:?}",
            target,
            sweep.codes,
            sweep.residuals
        );
        Ok(sweep.codes)
    }

    fn sweep<SPI, CS, P, D>(
        &self,
        fe: &mut Frontend<SPI, CS, P, D>,
        target: OffsetTarget,
    ) -> Result<Sweep, Error>
    where
        SPI: Transfer<u8> + Reconfigure,
        CS: OutputPin,
        P: OutputPin,
        D: DelayUs<u16>,
    {
        let s = &self.settings;
        let (settle, previous) = match target {
            OffsetTarget::Current => (*s.current_settle, self.state.current_offset),
            OffsetTarget::Voltage => (*s.voltage_settle, self.state.voltage_offset),
        };
        let line = target.line();
        let zero = Channel::ALL.map(|ch| self.state.adc_zero_error(SWEEP_RANGE, ch));

        for ch in Channel::ALL {
            fe.set_output_mode(ch, target.mode())?;
        }
        fe.set_adc_range(SWEEP_RANGE)?;

        let mut sweep = Sweep::new(previous);
        for code in *s.window_start..*s.window_end {
            fe.write_amplitudes(DacCode::from(code), DacCode::from(code))?;
            fe.settle(settle);
            let mut residuals = [0.0f32; 2];
            for ch in Channel::ALL {
                for _ in 0..*s.samples {
                    let sample = fe.read_adc(ch, line)?;
                    residuals[ch as usize] += sample as f32 - zero[ch as usize];
                }
            }
            sweep.update(code, residuals);
        }

        let [c0, c1] = sweep.codes;
        fe.write_amplitudes(DacCode::from(c0), DacCode::from(c1))?;
        Ok(sweep)
    }
}
