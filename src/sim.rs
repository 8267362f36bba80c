//! Simulated front end board for host tests.
//!
//! Models the shared SPI bus with its chip selects, the AD5752 input/latch
//! registers, the AD7321 control/range registers including the one conversion
//! lag after a mux change, the output enable lines and a linear analog front end.
use std::{cell::RefCell, convert::Infallible, rc::Rc, vec::Vec};

use embedded_hal::{
    blocking::{delay::DelayUs, spi::Transfer},
    digital::v2::OutputPin,
    spi::{MODE_1, MODE_2},
};

use crate::{
    bus::{Bus, Family, Peripheral, Profile, Reconfigure},
    dac::Dac,
    frontend::Frontend,
    output::OutputStage,
    settings::BusSettings,
    Channel,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    Select(Peripheral),
    Latch(Channel),
    Enable(Channel, usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Pin(Line, bool),
    Transfer(Peripheral, Vec<u8>),
    Reconfigure(Family),
    Delay(u16),
}

/// Linear analog model, per channel.
///
/// Gains are ADC counts per DAC code at the ±10 V ADC range and scale inversely
/// with the selected range.
#[derive(Clone, Copy, Debug)]
pub struct Analog {
    /// DAC code at which the output voltage is zero in voltage mode.
    pub voltage_zero: [f32; 2],
    /// DAC code at which no current flows into the grounded load.
    pub current_zero: [f32; 2],
    pub voltage_gain: f32,
    pub current_gain: f32,
    /// Bipolar zero error of the ADC in counts.
    pub adc_zero_error: [i32; 2],
}

impl Default for Analog {
    fn default() -> Self {
        Self {
            voltage_zero: [0.0; 2],
            current_zero: [0.0; 2],
            voltage_gain: 0.5,
            current_gain: 0.5,
            adc_zero_error: [0; 2],
        }
    }
}

#[derive(Debug)]
pub struct State {
    pub analog: Analog,
    /// Chip select levels, true is deselected.
    pub cs: [bool; 4],
    pub latch: [bool; 2],
    pub enable: [[bool; 2]; 2],
    pub profile: Option<Profile>,
    pub dac_input: [i16; 2],
    pub dac_output: [i16; 2],
    pub dac_span: [Option<u16>; 2],
    pub dac_powered: [bool; 2],
    pub adc_mux: [u16; 2],
    pub adc_reference: [bool; 2],
    pub adc_range: [u16; 2],
    pub events: Vec<Event>,
    /// Data phases attempted so far.
    transfers: usize,
    /// Data phase that fails, counted like `transfers`.
    fail_at: Option<usize>,
}

impl State {
    fn new(analog: Analog) -> Self {
        Self {
            analog,
            cs: [true; 4],
            latch: [true; 2],
            enable: [[false; 2]; 2],
            profile: None,
            dac_input: [0; 2],
            dac_output: [0; 2],
            dac_span: [None; 2],
            dac_powered: [false; 2],
            adc_mux: [0; 2],
            adc_reference: [false; 2],
            adc_range: [0; 2],
            events: Vec::new(),
            transfers: 0,
            fail_at: None,
        }
    }

    pub fn mode_bits(&self, ch: usize) -> u8 {
        self.enable[ch][0] as u8 | (self.enable[ch][1] as u8) << 1
    }

    fn set_pin(&mut self, line: Line, high: bool) {
        self.events.push(Event::Pin(line, high));
        match line {
            Line::Select(p) => self.cs[p.index()] = high,
            Line::Latch(ch) => {
                let ch = ch as usize;
                // LDAC falling edge loads the DAC register from the input register.
                if self.latch[ch] && !high {
                    self.dac_output[ch] = self.dac_input[ch];
                }
                self.latch[ch] = high;
            }
            Line::Enable(ch, bit) => self.enable[ch as usize][bit] = high,
        }
    }

    fn selected(&self) -> Peripheral {
        let low: Vec<Peripheral> = Peripheral::ALL
            .into_iter()
            .filter(|p| !self.cs[p.index()])
            .collect();
        assert_eq!(low.len(), 1, "expected exactly one selected peripheral");
        low[0]
    }

    fn transfer(&mut self, words: &mut [u8]) {
        let peripheral = self.selected();
        let profile = self.profile.expect("bus not configured");
        match peripheral.family() {
            Family::Dac => assert!(profile.mode == MODE_1, "DAC frame with {profile:?}"),
            Family::Adc => assert!(profile.mode == MODE_2, "ADC frame with {profile:?}"),
        }
        self.events.push(Event::Transfer(peripheral, words.to_vec()));
        match (peripheral, words.len()) {
            (Peripheral::Dac(ch), 3) => {
                self.dac_frame(ch as usize, words);
                words.fill(0);
            }
            (Peripheral::Adc(ch), 2) => {
                let response = self.adc_frame(ch as usize, u16::from_be_bytes([words[0], words[1]]));
                words.copy_from_slice(&response.to_be_bytes());
            }
            _ => {}
        }
    }

    fn dac_frame(&mut self, ch: usize, words: &[u8]) {
        assert_eq!(words[0] & 0x80, 0, "read access not modelled");
        let data = u16::from_be_bytes([words[1], words[2]]);
        match (words[0] >> 3) & 0b111 {
            0b000 => self.dac_input[ch] = data as i16,
            0b001 => self.dac_span[ch] = Some(data & 0b111),
            0b010 => self.dac_powered[ch] = data & 1 != 0,
            reg => panic!("unexpected DAC register {reg:#05b}"),
        }
    }

    /// The conversion returned during a frame samples the input selected before
    /// that frame; a control write only takes effect for the next frame.
    fn adc_frame(&mut self, ch: usize, word: u16) -> u16 {
        let mux = self.adc_mux[ch];
        let code = self.convert(ch, mux);
        if word & 0x8000 != 0 {
            match (word >> 13) & 0b11 {
                0b00 => {
                    self.adc_mux[ch] = (word >> 10) & 1;
                    self.adc_reference[ch] = word & 0x10 != 0;
                }
                0b01 => self.adc_range[ch] = (word >> 11) & 0b11,
                _ => {}
            }
        }
        (mux << 13) | (code as u16 & 0x1fff)
    }

    fn full_scale(&self, ch: usize) -> f32 {
        match self.adc_range[ch] {
            0b00 => 10.0,
            0b01 => 5.0,
            0b10 => 2.5,
            r => panic!("invalid range bits {r:#04b}"),
        }
    }

    fn convert(&self, ch: usize, mux: u16) -> i32 {
        let a = &self.analog;
        let code = self.dac_output[ch] as f32;
        let counts = match (mux, self.mode_bits(ch)) {
            // Voltage drive, sensing the output voltage.
            (0, 0) => (code - a.voltage_zero[ch]) * a.voltage_gain,
            // Current drive or grounded output, sensing the load current.
            (1, 1) | (1, 3) => (code - a.current_zero[ch]) * a.current_gain,
            _ => 0.0,
        } * (10.0 / self.full_scale(ch));
        (counts.round() as i32 + a.adc_zero_error[ch]).clamp(-4096, 4095)
    }
}

#[derive(Clone, Default)]
pub struct Board(Rc<RefCell<State>>);

impl Default for State {
    fn default() -> Self {
        Self::new(Analog::default())
    }
}

impl Board {
    pub fn new(analog: Analog) -> Self {
        Self(Rc::new(RefCell::new(State::new(analog))))
    }

    pub fn state(&self) -> std::cell::Ref<'_, State> {
        self.0.borrow()
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    /// Make the `n`th data phase from now fail without reaching any converter.
    pub fn fail_transfer(&self, n: usize) {
        let mut state = self.0.borrow_mut();
        state.fail_at = Some(state.transfers + n);
    }

    pub fn pin(&self, line: Line) -> SimPin {
        SimPin {
            board: self.clone(),
            line,
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.clone())
    }

    pub fn bus(&self) -> Bus<SimSpi, SimPin> {
        let settings = BusSettings::default();
        let (dac, adc) = settings.profiles();
        Bus::new(
            SimSpi(self.clone()),
            Peripheral::ALL.map(|p| self.pin(Line::Select(p))),
            dac,
            adc,
        )
        .unwrap()
    }

    pub fn dac(&self) -> Dac<SimPin> {
        Dac::new(Channel::ALL.map(|ch| self.pin(Line::Latch(ch)))).unwrap()
    }

    pub fn output(&self) -> OutputStage<SimPin> {
        OutputStage::new(Channel::ALL.map(|ch| [0, 1].map(|bit| self.pin(Line::Enable(ch, bit)))))
    }

    pub fn frontend(&self) -> Frontend<SimSpi, SimPin, SimPin, SimDelay> {
        Frontend::new(self.bus(), self.dac(), self.output(), self.delay())
    }
}

pub struct SimPin {
    board: Board,
    line: Line,
}

impl OutputPin for SimPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.board.0.borrow_mut().set_pin(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.board.0.borrow_mut().set_pin(self.line, true);
        Ok(())
    }
}

pub struct SimSpi(Board);

impl Transfer<u8> for SimSpi {
    type Error = ();

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], ()> {
        let mut state = self.0 .0.borrow_mut();
        state.transfers += 1;
        if state.fail_at == Some(state.transfers) {
            return Err(());
        }
        state.transfer(words);
        Ok(words)
    }
}

impl Reconfigure for SimSpi {
    type Error = Infallible;

    fn reconfigure(&mut self, profile: &Profile) -> Result<(), Infallible> {
        let mut state = self.0 .0.borrow_mut();
        let family = if profile.mode == MODE_1 {
            Family::Dac
        } else {
            Family::Adc
        };
        state.events.push(Event::Reconfigure(family));
        state.profile = Some(*profile);
        Ok(())
    }
}

pub struct SimDelay(Board);

impl DelayUs<u16> for SimDelay {
    fn delay_us(&mut self, us: u16) {
        self.0 .0.borrow_mut().events.push(Event::Delay(us));
    }
}
