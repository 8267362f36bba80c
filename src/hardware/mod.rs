//! # StimJim firmware
//!
//! Hardware specific setup etc.

pub use stm32h7xx_hal as hal;

pub mod delay;
pub mod metadata;
pub mod setup;
pub mod spi;

/// System timer (RTIC Monotonic) tick frequency
pub const MONOTONIC_FREQUENCY: u32 = 1_000;
rtic_monotonics::systick_monotonic!(Systick, MONOTONIC_FREQUENCY);

/// Chip select, latch and output enable lines.
pub type Pin = hal::gpio::ErasedPin<hal::gpio::Output<hal::gpio::PushPull>>;

pub type Frontend = crate::frontend::Frontend<spi::ConverterSpi, Pin, Pin, delay::AsmDelay>;
