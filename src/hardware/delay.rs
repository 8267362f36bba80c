use super::hal::hal::blocking::delay::DelayUs;

/// Busy-wait delay for analog settling.
pub struct AsmDelay {
    cycles_per_us: u32,
}

impl AsmDelay {
    /// # Args
    /// * `core_frequency` - CPU core clock in Hz
    pub fn new(core_frequency: u32) -> Self {
        Self {
            // `asm::delay` loops are dual issued on the M7.
            // See https://github.com/rust-embedded/cortex-m/issues/430
            cycles_per_us: (core_frequency / 1_000_000) * 2,
        }
    }
}

impl DelayUs<u16> for AsmDelay {
    fn delay_us(&mut self, us: u16) {
        cortex_m::asm::delay(self.cycles_per_us * u32::from(us))
    }
}
