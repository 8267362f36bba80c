//! Board bring-up: clocks, logging, converter bus and front end pins.
//!
//! Wiring:
//! * SPI1: SCK PA5, MISO PA6, MOSI PD7
//! * chip selects: DAC0 PE2, DAC1 PE3, ADC0 PE4, ADC1 PE5
//! * LDAC: PE6 (channel 0), PE7 (channel 1)
//! * output enables: PF0, PF1 (channel 0), PF2, PF3 (channel 1)
use log::info;
use rtt_logger::RTTLogger;

use super::{
    delay::AsmDelay,
    hal::{self, prelude::*, spi::Spi},
    metadata::ApplicationMetadata,
    spi::ConverterSpi,
    Frontend, Pin, Systick,
};
use crate::{bus::Bus, dac::Dac, output::OutputStage, settings::Settings, Error};

pub fn setup(
    core: rtic::export::Peripherals,
    device: hal::stm32::Peripherals,
    settings: &Settings,
) -> Result<Frontend, Error> {
    static LOGGER: RTTLogger = RTTLogger::new(log::LevelFilter::Info);
    rtt_target::rtt_init_print!();
    // Only fails if a logger is already installed.
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Info))
        .ok();
    info!("---Starting Hardware Setup");

    let pwr = device.PWR.constrain();
    let pwrcfg = pwr.freeze();
    let rcc = device.RCC.constrain();
    let ccdr = rcc
        .sysclk(400.MHz())
        .pll1_q_ck(100.MHz())
        .freeze(pwrcfg, &device.SYSCFG);

    Systick::start(core.SYST, ccdr.clocks.sysclk().to_Hz());

    let metadata = ApplicationMetadata::new();
    info!(
        "{} {} ({}, rustc {}, dirty: {})",
        metadata.app,
        metadata.firmware_version,
        metadata.profile,
        metadata.rust_version,
        metadata.git_dirty
    );

    let gpioa = device.GPIOA.split(ccdr.peripheral.GPIOA);
    let gpiod = device.GPIOD.split(ccdr.peripheral.GPIOD);
    let gpioe = device.GPIOE.split(ccdr.peripheral.GPIOE);
    let gpiof = device.GPIOF.split(ccdr.peripheral.GPIOF);

    let (dac_profile, adc_profile) = settings.bus.profiles();
    let spi: Spi<_, _, u8> = device.SPI1.spi(
        (
            gpioa.pa5.into_alternate::<5>(),
            gpioa.pa6.into_alternate::<5>(),
            gpiod.pd7.into_alternate::<5>(),
        ),
        dac_profile.mode,
        hal::time::Hertz::from_raw(dac_profile.frequency),
        ccdr.peripheral.SPI1,
        &ccdr.clocks,
    );
    let cs: [Pin; 4] = [
        gpioe.pe2.into_push_pull_output().erase(),
        gpioe.pe3.into_push_pull_output().erase(),
        gpioe.pe4.into_push_pull_output().erase(),
        gpioe.pe5.into_push_pull_output().erase(),
    ];
    let bus = Bus::new(
        ConverterSpi::new(spi, ccdr.clocks),
        cs,
        dac_profile,
        adc_profile,
    )?;

    let dac = Dac::new([
        gpioe.pe6.into_push_pull_output().erase(),
        gpioe.pe7.into_push_pull_output().erase(),
    ])?;

    let output = OutputStage::new([
        [
            gpiof.pf0.into_push_pull_output().erase(),
            gpiof.pf1.into_push_pull_output().erase(),
        ],
        [
            gpiof.pf2.into_push_pull_output().erase(),
            gpiof.pf3.into_push_pull_output().erase(),
        ],
    ]);

    let delay = AsmDelay::new(ccdr.clocks.c_ck().to_Hz());

    info!("---Hardware Setup done");
    Ok(crate::frontend::Frontend::new(bus, dac, output, delay))
}
