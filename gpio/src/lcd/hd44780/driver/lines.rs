use crate::{GpioDirection, GpioDriver, GpioError, GpioLine, GpioResult};
use log::debug;
use std::fmt::{Debug, Formatter};

/// Which GPIO line is wired to which pin of the module.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HD44780PinMap {
    /// Data lines, D7 first: `[D7, D6, D5, D4]`.
    pub data: [usize; 4],
    /// Enable strobe.
    pub e: usize,
    /// Read/write select.
    pub rw: usize,
    /// Register select.
    pub rs: usize,
    /// Module power switch, active high.
    pub power: usize,
}

impl HD44780PinMap {
    /// All line indices, in the order D7, D6, D5, D4, E, RW, RS, power.
    pub fn indices(&self) -> [usize; 8] {
        let [d7, d6, d5, d4] = self.data;
        [d7, d6, d5, d4, self.e, self.rw, self.rs, self.power]
    }

    /// Checks that no line is used for two signals.
    pub fn validate(&self) -> GpioResult<()> {
        let indices = self.indices();
        for (i, index) in indices.iter().enumerate() {
            if indices[i + 1..].contains(index) {
                return Err(GpioError::InvalidArgument);
            }
        }
        Ok(())
    }
}

/// The claimed lines of one module.
///
/// Owns every line for as long as it lives, so nothing else can drive the bus meanwhile.
pub struct HD44780Lines<'a> {
    /// `[D7, D6, D5, D4]`
    pub(crate) data: [Box<dyn GpioLine + 'a>; 4],
    pub(crate) e: Box<dyn GpioLine + 'a>,
    pub(crate) rw: Box<dyn GpioLine + 'a>,
    pub(crate) rs: Box<dyn GpioLine + 'a>,
    pub(crate) power: Box<dyn GpioLine + 'a>,
}

impl<'a> HD44780Lines<'a> {
    /// Claims the lines listed in `map` from `driver`.
    pub fn acquire<G: GpioDriver + ?Sized>(driver: &'a G, map: &HD44780PinMap) -> GpioResult<Self> {
        map.validate()?;
        debug!("Claiming HD44780 lines {:?}", map);

        let [d7, d6, d5, d4] = map.data;
        Ok(HD44780Lines {
            data: [
                driver.get_line(d7)?,
                driver.get_line(d6)?,
                driver.get_line(d5)?,
                driver.get_line(d4)?,
            ],
            e: driver.get_line(map.e)?,
            rw: driver.get_line(map.rw)?,
            rs: driver.get_line(map.rs)?,
            power: driver.get_line(map.power)?,
        })
    }

    /// D7, which doubles as the busy flag.
    pub(crate) fn d7(&mut self) -> &mut (dyn GpioLine + 'a) {
        &mut *self.data[0]
    }

    /// Makes every signal line an output, with E, RW and RS low.
    ///
    /// The data lines keep their latched levels; the power line is left alone.
    pub(crate) fn configure_outputs(&mut self) -> GpioResult<()> {
        for line in &mut self.data {
            line.set_direction(GpioDirection::Output)?;
        }
        self.e.set_output(false)?;
        self.rw.set_output(false)?;
        self.rs.set_output(false)?;
        Ok(())
    }

    /// Puts bits 7..4 of `value` on D7..D4. The lower bits are ignored.
    pub(crate) fn write_upper_nibble(&mut self, value: u8) -> GpioResult<()> {
        for (bit, line) in self.data.iter_mut().enumerate() {
            line.set_level(value & (0b10000000 >> bit) != 0)?;
        }
        Ok(())
    }
}

impl Debug for HD44780Lines<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HD44780Lines")
            .field("data", &self.data)
            .field("e", &self.e)
            .field("rw", &self.rw)
            .field("rs", &self.rs)
            .field("power", &self.power)
            .finish()
    }
}
