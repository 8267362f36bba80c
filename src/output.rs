//! Output stage mode control.
//!
//! Each channel's analog front end is switched by two enable lines. The mode is a
//! plain 2 bit field: bit 0 drives the first line, bit 1 the second.
use bitbybit::bitenum;
use embedded_hal::digital::v2::{OutputPin, PinState};

use crate::{Channel, Error};

/// Output stage configuration.
///
/// All four patterns are legal. `Voltage` and `Current` energize the output.
#[derive(Debug, PartialEq, Eq)]
#[bitenum(u2, exhaustive = true)]
pub enum OutputMode {
    Voltage = 0,
    Current = 1,
    HighZ = 2,
    Ground = 3,
}

impl From<OutputMode> for [PinState; 2] {
    fn from(mode: OutputMode) -> Self {
        let bits = mode.raw_value().value();
        [(bits & 0b01 != 0).into(), (bits & 0b10 != 0).into()]
    }
}

pub struct OutputStage<P> {
    enable: [[P; 2]; 2],
    mode: [Option<OutputMode>; 2],
}

impl<P: OutputPin> OutputStage<P> {
    /// # Args
    /// * `enable` - `[channel][bit]` output enable lines
    pub fn new(enable: [[P; 2]; 2]) -> Self {
        Self {
            enable,
            mode: [None; 2],
        }
    }

    /// Set the output mode of a channel.
    pub fn set_mode(&mut self, ch: Channel, mode: OutputMode) -> Result<(), Error> {
        let states: [PinState; 2] = mode.into();
        for (pin, state) in self.enable[ch as usize].iter_mut().zip(states) {
            pin.set_state(state).map_err(|_| Error::Pin)?;
        }
        self.mode[ch as usize] = Some(mode);
        log::debug!("{:?} output mode {:?}", ch, mode);
        Ok(())
    }

    /// Last mode set on a channel, `None` before the first `set_mode()`.
    pub fn mode(&self, ch: Channel) -> Option<OutputMode> {
        self.mode[ch as usize]
    }
}
