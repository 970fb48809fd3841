mod config;
mod demo;
mod row;

use dotenv::dotenv;
use log::{debug, info, warn};
use sysinfo::System;
use lcd1602_gpio::delay::StdDelay;
use lcd1602_gpio::gpiod::GpiodDriver;
use lcd1602_gpio::lcd::hd44780::driver::{HD44780PinMap, Row};
use lcd1602_gpio::lcd::hd44780::sim::HD44780Sim;
use lcd1602_gpio::raw::RawGpioDriver;
use lcd1602_gpio::sim::{SimDelay, SimGpioDriver};
use crate::config::{Backend, Config};

fn log_host_info() {
    const UNKNOWN_STR: &str = "???";

    info!(
        "Running on {}",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!("Architecture {}", System::cpu_arch());
}

fn run_simulated(pins: &HD44780PinMap, config: &Config) -> eyre::Result<()> {
    let count = pins.indices().into_iter().max().unwrap_or(0) + 1;
    let gpio = SimGpioDriver::with_device(count, HD44780Sim::new(*pins));
    debug!("{:?} initialized.", gpio);

    demo::run_on(&gpio, pins, config, SimDelay::new(&gpio))?;

    let display = gpio.device();
    info!("Simulated display after {:?}:", gpio.now());
    info!("|{}|", display.row_text(Row::One));
    info!("|{}|", display.row_text(Row::Two));
    for violation in display.violations() {
        warn!("Protocol violation: {:?}", violation);
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    let env_file = dotenv();
    pretty_env_logger::init();

    info!("LCD1602 starting...");
    match env_file {
        Ok(path) => debug!("Environment loaded from {:?}", path),
        Err(err) => warn!("No .env loaded: {}", err),
    }
    log_host_info();

    let pins = config::pin_map_from_env()?;
    info!("LCD @ E: {}, RW: {}, RS: {}, Data: {:?}, Power: {}",
        pins.e, pins.rw, pins.rs, pins.data, pins.power);

    let config_path = Config::path();
    debug!("Trying to load config from {:?}...", config_path);
    let config = Config::load_or_create(&config_path)?;
    debug!("{:?}", config);

    let backend = Backend::from_env()?;
    info!("Using {:?} GPIO backend", backend);

    match backend {
        Backend::GpioMem | Backend::Mem => {
            let gpio = if backend == Backend::Mem {
                RawGpioDriver::new_mem()?
            } else {
                RawGpioDriver::new_gpiomem()?
            };
            debug!("{:?} initialized.", gpio);
            demo::run_on(&gpio, &pins, &config, StdDelay)?;
        }
        Backend::Gpiod => {
            let gpio = GpiodDriver::open(config::gpiod_chip_from_env())?;
            debug!("{:?} initialized.", gpio);
            demo::run_on(&gpio, &pins, &config, StdDelay)?;
        }
        Backend::Sim => run_simulated(&pins, &config)?,
    }

    info!("Done.");
    Ok(())
}
