//! The greeting, then the readings.

use embedded_hal::delay::DelayNs;
use log::{debug, info};
use lcd1602_gpio::{GpioDriver, GpioResult};
use lcd1602_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Driver, HD44780Lines, HD44780PinMap};
use crate::config::Config;
use crate::row::{update_row, RowBuffer};

/// Time between initialization and the first write.
pub const SETTLE_MS: u32 = 100;

/// Claims the lines in `pins` from `gpio` and runs [run] on them.
///
/// The lines are released again when this returns.
pub fn run_on<G, D>(gpio: &G, pins: &HD44780PinMap, config: &Config, delay: D) -> GpioResult<()>
where
    G: GpioDriver + ?Sized,
    D: DelayNs + Clone,
{
    let lines = HD44780Lines::acquire(gpio, pins)?;
    let mut lcd = GpioHD44780Driver::with_options(lines, delay.clone(), config.driver_options());
    debug!("{:?} created.", lcd);

    let mut delay = delay;
    run(&mut lcd, &mut delay, config)
}

pub fn run(lcd: &mut dyn HD44780Driver, delay: &mut impl DelayNs, config: &Config) -> GpioResult<()> {
    lcd.initialize()?;
    info!("Display initialized.");
    delay.delay_ms(SETTLE_MS);

    update_row(lcd, 1, &RowBuffer::compose(Some(config.greeting.as_str()), None, None))?;
    delay.delay_ms(config.hold_ms);

    update_row(lcd, 1, &RowBuffer::blank())?;
    delay.delay_ms(config.hold_ms);

    let temperature = RowBuffer::compose(Some("Temperature: "), config.temperature, Some("C"));
    let humidity = RowBuffer::compose(Some("Humidity: "), config.humidity, Some("%"));
    update_row(lcd, 1, &temperature)?;
    update_row(lcd, 2, &humidity)?;
    info!("Showing |{}| |{}|", temperature, humidity);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::time::Duration;
    use lcd1602_gpio::GpioError;
    use lcd1602_gpio::lcd::hd44780::driver::{Register, Row, MIN_BUSY_POLLS};
    use lcd1602_gpio::lcd::hd44780::sim::HD44780Sim;
    use lcd1602_gpio::sim::{SimDelay, SimGpioDriver};

    const PINS: HD44780PinMap = HD44780PinMap {
        data: [21, 20, 16, 26],
        e: 17,
        rw: 27,
        rs: 22,
        power: 5,
    };

    fn gpio() -> SimGpioDriver<HD44780Sim> {
        SimGpioDriver::with_device(28, HD44780Sim::new(PINS))
    }

    #[test]
    fn ends_with_the_readings() {
        let gpio = gpio();
        run_on(&gpio, &PINS, &Config::default(), SimDelay::new(&gpio)).unwrap();

        let sim = gpio.device();
        assert!(sim.display_on());
        assert_eq!(sim.row_text(Row::One), "Temperature: 16C");
        assert_eq!(sim.row_text(Row::Two), "Humidity: 42%   ");
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[test]
    fn greeting_comes_first() {
        let gpio = gpio();
        let config = Config {
            greeting: "Hi!".to_string(),
            ..Config::default()
        };
        run_on(&gpio, &PINS, &config, SimDelay::new(&gpio)).unwrap();

        let sim = gpio.device();
        let data: Vec<u8> = sim
            .transfers()
            .iter()
            .filter(|t| t.register == Register::Data)
            .map(|t| t.value)
            .collect();
        assert_eq!(&data[..16], b"Hi!             ");
        assert_eq!(&data[16..32], [b' '; 16]);
        assert_eq!(data.len(), 64);
    }

    #[test]
    fn holds_between_screens() {
        let gpio = gpio();
        let config = Config {
            hold_ms: 250,
            ..Config::default()
        };
        run_on(&gpio, &PINS, &config, SimDelay::new(&gpio)).unwrap();

        let delays = gpio.delays();
        let long: Vec<Duration> = delays
            .iter()
            .copied()
            .filter(|d| *d >= Duration::from_millis(1))
            .collect();
        assert_eq!(
            long,
            [Duration::from_millis(50), Duration::from_millis(100), Duration::from_millis(250), Duration::from_millis(250)],
        );
    }

    #[test]
    fn missing_readings_stay_blank() {
        let gpio = gpio();
        let config = Config {
            temperature: None,
            humidity: None,
            ..Config::default()
        };
        run_on(&gpio, &PINS, &config, SimDelay::new(&gpio)).unwrap();

        let sim = gpio.device();
        assert_eq!(sim.row_text(Row::One), "Temperature:    ");
        assert_eq!(sim.row_text(Row::Two), "Humidity:    %  ");
    }

    #[test]
    fn dead_display_is_reported() {
        let gpio = gpio();
        gpio.device_mut().set_stuck_busy(true);
        let config = Config {
            max_busy_polls: NonZeroU32::new(10),
            ..Config::default()
        };

        let result = run_on(&gpio, &PINS, &config, SimDelay::new(&gpio));
        assert_eq!(result, Err(GpioError::Unresponsive(MIN_BUSY_POLLS)));
        // Everything was released on the way out
        assert!(gpio.get_line(PINS.e).is_ok());
    }

    #[test]
    fn lines_in_use_are_not_taken() {
        let gpio = gpio();
        let _e = gpio.get_line(PINS.e).unwrap();

        let result = run_on(&gpio, &PINS, &Config::default(), SimDelay::new(&gpio));
        assert_eq!(result, Err(GpioError::AlreadyInUse));
    }
}
