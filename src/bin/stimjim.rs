//! # StimJim
//!
//! Firmware for the StimJim two channel current/voltage stimulator front end.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
use panic_probe as _; // global panic handler

#[cfg(not(target_os = "none"))]
fn main() {
    let settings: heapless::String<1024> =
        serde_json_core::to_string(&stimjim::settings::Settings::default()).unwrap();
    println!("{}", settings);
}

#[cfg(target_os = "none")]
#[rtic::app(device = stm32h7xx_hal::stm32, peripherals = true, dispatchers = [DCMI])]
mod app {
    use fugit::ExtU32;
    use rtic_monotonics::Monotonic;
    use stimjim::{
        adc::InputLine,
        calibration::{CalibrationState, Calibrator},
        hardware::{setup::setup, Frontend, Systick},
        settings::Settings,
        Channel,
    };

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        frontend: Frontend,
        calibration: CalibrationState,
    }

    #[init]
    fn init(c: init::Context) -> (Shared, Local) {
        let settings = Settings::default();
        let mut frontend = setup(c.core, c.device, &settings).unwrap();

        let mut calibrator = Calibrator::new(settings.calibration);
        frontend.initialize(&mut calibrator).unwrap();

        monitor::spawn().unwrap();

        (
            Shared {},
            Local {
                frontend,
                calibration: *calibrator.state(),
            },
        )
    }

    #[task(priority = 1, local=[frontend, calibration])]
    async fn monitor(c: monitor::Context) {
        const PERIOD: u32 = 1000; // ms
        const SAMPLES: u16 = 16;
        loop {
            for ch in Channel::ALL {
                let frontend = &mut *c.local.frontend;
                let state = &*c.local.calibration;
                let voltage = frontend.measure(state, ch, InputLine::Voltage, SAMPLES);
                let current = frontend.measure(state, ch, InputLine::Current, SAMPLES);
                match (voltage, current) {
                    (Ok(v), Ok(i)) => log::info!("{:?}: {:.1} mV, {:.2} µA", ch, v, i),
                    (Err(e), _) | (_, Err(e)) => log::error!("{:?}: {:?}", ch, e),
                }
            }
            Systick::delay(PERIOD.millis()).await;
        }
    }
}
