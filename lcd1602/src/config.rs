use std::env::var_os;
use std::ffi::OsStr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use dotenv::var;
use eyre::{eyre, WrapErr};
use log::info;
use serde::{Serialize, Deserialize};
use lcd1602_gpio::lcd::hd44780::driver::{HD44780Options, HD44780PinMap};

/// What goes on the display and how patient the driver is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// First text shown after initialization.
    pub greeting: String,
    /// Degrees Celsius; `null` leaves the number blank.
    pub temperature: Option<u8>,
    /// Relative humidity in percent; `null` leaves the number blank.
    pub humidity: Option<u8>,
    /// How long the greeting and the blank screen stay up.
    pub hold_ms: u32,
    /// Give up after this many busy-flag polls. Unbounded when absent.
    ///
    /// Values below [MIN_BUSY_POLLS](lcd1602_gpio::lcd::hd44780::driver::MIN_BUSY_POLLS) are
    /// raised to it. A single clear already takes a few hundred polls.
    pub max_busy_polls: Option<NonZeroU32>,
}

impl Config {
    pub fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("config.json"));
        PathBuf::from(config_str)
    }

    /// `Ok(None)` when there is no file. A file that exists but doesn't parse is an error.
    pub fn load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(config_path)
            .wrap_err_with(|| format!("Failed to open config {:?}", config_path))?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Invalid config in {:?}", config_path))?;
        Ok(Some(config))
    }

    /// Loads the config at `config_path`, writing the defaults there first if there is no file.
    pub fn load_or_create(config_path: &Path) -> eyre::Result<Self> {
        if let Some(config) = Self::load_from(config_path)? {
            info!("Config loaded.");
            return Ok(config);
        }

        info!("Config not found. Using default");
        let config = Config::default();
        config
            .save_to(config_path)
            .wrap_err_with(|| format!("Failed to save default config to {:?}", config_path))?;
        info!("Default config saved.");
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn driver_options(&self) -> HD44780Options {
        HD44780Options {
            max_busy_polls: self.max_busy_polls,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            greeting: "Hello there!".to_string(),
            temperature: Some(16),
            humidity: Some(42),
            hold_ms: 1000,
            max_busy_polls: None,
        }
    }
}

/// Where the GPIO lines come from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Backend {
    /// BCM283x registers through `/dev/gpiomem`.
    #[default]
    GpioMem,
    /// BCM283x registers through `/dev/mem`; needs root.
    Mem,
    /// Linux GPIO character device.
    Gpiod,
    /// Simulated lines with a simulated display attached.
    Sim,
}

impl FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> eyre::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpiomem" => Ok(Backend::GpioMem),
            "mem" => Ok(Backend::Mem),
            "gpiod" => Ok(Backend::Gpiod),
            "sim" => Ok(Backend::Sim),
            other => Err(eyre!("Unknown GPIO backend {:?}", other)),
        }
    }
}

impl Backend {
    pub fn from_env() -> eyre::Result<Self> {
        match var("LCD1602_GPIO_BACKEND") {
            Ok(backend) => backend.parse(),
            Err(_) => Ok(Backend::default()),
        }
    }
}

pub fn gpiod_chip_from_env() -> String {
    var("LCD1602_GPIOD_CHIP").unwrap_or_else(|_| "/dev/gpiochip0".to_string())
}

pub fn parse_pin_bus(pin_str: &str) -> eyre::Result<[usize; 4]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre!("Invalid number of data pins"))
}

fn parse_pin(name: &str) -> eyre::Result<usize> {
    let value = var(name).map_err(|_| eyre!("{} is not set", name))?;
    Ok(value.trim().parse()?)
}

/// Reads the wiring from `LCD1602_PIN_*` and `LCD1602_PINS_DATA`.
pub fn pin_map_from_env() -> eyre::Result<HD44780PinMap> {
    let data = var("LCD1602_PINS_DATA").map_err(|_| eyre!("LCD1602_PINS_DATA is not set"))?;
    let pins = HD44780PinMap {
        data: parse_pin_bus(&data)?,
        e: parse_pin("LCD1602_PIN_E")?,
        rw: parse_pin("LCD1602_PIN_RW")?,
        rs: parse_pin("LCD1602_PIN_RS")?,
        power: parse_pin("LCD1602_PIN_POWER")?,
    };
    pins.validate()?;
    Ok(pins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lcd1602-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn pin_bus_separators() {
        assert_eq!(parse_pin_bus("21, 20;16 26").unwrap(), [21, 20, 16, 26]);
        assert_eq!(parse_pin_bus("  5,6,13,19  ").unwrap(), [5, 6, 13, 19]);
        assert!(parse_pin_bus("1 2 3").is_err());
        assert!(parse_pin_bus("1 2 3 4 5").is_err());
        assert!(parse_pin_bus("1 2 x 4").is_err());
    }

    #[test]
    fn backend_names() {
        assert_eq!("gpiomem".parse::<Backend>().unwrap(), Backend::GpioMem);
        assert_eq!(" SIM ".parse::<Backend>().unwrap(), Backend::Sim);
        assert_eq!("gpiod".parse::<Backend>().unwrap(), Backend::Gpiod);
        assert_eq!("mem".parse::<Backend>().unwrap(), Backend::Mem);
        assert!("spi".parse::<Backend>().is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{ "temperature": 21, "max_busy_polls": 100 }"#).unwrap();
        assert_eq!(config.temperature, Some(21));
        assert_eq!(config.greeting, "Hello there!");
        assert_eq!(config.humidity, Some(42));
        assert_eq!(config.driver_options().max_busy_polls, NonZeroU32::new(100));
        assert_eq!(Config::default().driver_options(), HD44780Options::default());
    }

    #[test]
    fn zero_poll_bound_is_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "max_busy_polls": 0 }"#).is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let path = temp_path("saved");
        let config = Config {
            humidity: None,
            hold_ms: 5,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Some(config.clone()));
        assert_eq!(Config::load_or_create(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_loads_nothing() {
        let path = temp_path("missing");
        assert_eq!(Config::load_from(&path).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let path = temp_path("created");
        assert_eq!(Config::load_or_create(&path).unwrap(), Config::default());
        assert_eq!(Config::load_from(&path).unwrap(), Some(Config::default()));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn broken_file_is_an_error_and_stays_untouched() {
        let path = temp_path("broken");
        for contents in ["{ not json", r#"{ "greeting": "Mine", "max_busy_polls": 0 }"#] {
            std::fs::write(&path, contents).unwrap();

            assert!(Config::load_from(&path).is_err());
            let err = Config::load_or_create(&path).unwrap_err();
            assert!(format!("{:?}", err).contains("Invalid config"), "{:?}", err);
            assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
        }
        std::fs::remove_file(&path).unwrap();
    }
}
