//! Fixed-width rows for the 16x2 display.

use std::fmt::{Display, Formatter, Write};
use log::warn;
use lcd1602_gpio::GpioResult;
use lcd1602_gpio::lcd::hd44780::driver::{HD44780Driver, Row};

/// Characters per row.
pub const ROW_WIDTH: usize = 16;

/// Exactly [ROW_WIDTH] ASCII characters: longer text is cut off, shorter text padded with spaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowBuffer {
    text: heapless::String<ROW_WIDTH>,
}

impl RowBuffer {
    /// A row of spaces.
    pub fn blank() -> Self {
        Self::from_parts(&[])
    }

    /// `prefix`, then `value` in decimal, then `suffix`.
    ///
    /// A missing `value` still takes up three spaces, so the suffix stays where it would be for a
    /// three-digit number.
    pub fn compose(prefix: Option<&str>, value: Option<u8>, suffix: Option<&str>) -> Self {
        let mut number = heapless::String::<3>::new();
        match value {
            // A u8 never needs more than three digits
            Some(value) => {
                let _ = write!(number, "{}", value);
            }
            None => {
                let _ = number.push_str("   ");
            }
        }
        Self::from_parts(&[prefix.unwrap_or(""), number.as_str(), suffix.unwrap_or("")])
    }

    pub fn text(text: &str) -> Self {
        Self::from_parts(&[text])
    }

    fn from_parts(parts: &[&str]) -> Self {
        let mut text = heapless::String::new();
        for c in parts.iter().flat_map(|part| part.chars()) {
            let c = if c.is_ascii() && !c.is_ascii_control() {
                c
            } else {
                warn!("Unprintable character: {:?}", c);
                '?'
            };
            if text.push(c).is_err() {
                break;
            }
        }
        while text.push(' ').is_ok() {}
        RowBuffer { text }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

impl Display for RowBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text.as_str())
    }
}

/// Writes `content` over the whole of row number `row` (1 or 2).
///
/// Any other row number is logged and the text goes wherever the cursor happens to be.
pub fn update_row<L: HD44780Driver + ?Sized>(lcd: &mut L, row: u8, content: &RowBuffer) -> GpioResult<()> {
    match Row::try_from(row) {
        Ok(row) => lcd.set_cursor(row)?,
        Err(_) => warn!("There is no row {}, writing at the cursor", row),
    }
    lcd.write_string(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcd1602_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Lines, HD44780PinMap, Register};
    use lcd1602_gpio::lcd::hd44780::sim::HD44780Sim;
    use lcd1602_gpio::sim::{SimDelay, SimGpioDriver};

    const PINS: HD44780PinMap = HD44780PinMap {
        data: [4, 5, 6, 7],
        e: 0,
        rw: 1,
        rs: 2,
        power: 3,
    };

    #[test]
    fn compose_pads_to_the_full_width() {
        assert_eq!(RowBuffer::compose(Some("Humidity: "), Some(42), Some("%")).as_str(), "Humidity: 42%   ");
        assert_eq!(RowBuffer::compose(Some("Temperature: "), Some(16), Some("C")).as_str(), "Temperature: 16C");
        assert_eq!(RowBuffer::compose(Some("T"), Some(0), None).as_str(), "T0              ");
    }

    #[test]
    fn compose_truncates() {
        let row = RowBuffer::compose(Some("Temperature: "), Some(100), Some("C"));
        assert_eq!(row.as_str(), "Temperature: 100");
        assert_eq!(RowBuffer::text("0123456789abcdefXYZ").as_str(), "0123456789abcdef");
    }

    #[test]
    fn missing_value_leaves_three_spaces() {
        assert_eq!(RowBuffer::compose(Some("Hello there!"), None, None).as_str(), "Hello there!    ");
        assert_eq!(RowBuffer::compose(Some("x"), None, Some("y")).as_str(), "x   y           ");
        assert_eq!(RowBuffer::compose(None, None, None), RowBuffer::blank());
    }

    #[test]
    fn blank_is_all_spaces() {
        assert_eq!(RowBuffer::blank().as_str(), " ".repeat(ROW_WIDTH));
        assert_eq!(RowBuffer::blank().as_bytes().len(), ROW_WIDTH);
    }

    #[test]
    fn unprintable_characters_are_replaced() {
        assert_eq!(RowBuffer::text("25°C\0!").as_str(), "25?C?!          ");
    }

    #[test]
    fn update_row_writes_whole_rows() {
        let gpio = SimGpioDriver::with_device(8, HD44780Sim::new(PINS));
        let lines = HD44780Lines::acquire(&gpio, &PINS).unwrap();
        let mut lcd = GpioHD44780Driver::new(lines, SimDelay::new(&gpio));
        lcd.initialize().unwrap();

        update_row(&mut lcd, 2, &RowBuffer::text("second")).unwrap();
        update_row(&mut lcd, 1, &RowBuffer::text("first")).unwrap();

        let sim = gpio.device();
        assert_eq!(sim.row_text(Row::One), "first           ");
        assert_eq!(sim.row_text(Row::Two), "second          ");
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn update_row_skips_the_cursor_for_unknown_rows() {
        let gpio = SimGpioDriver::with_device(8, HD44780Sim::new(PINS));
        let lines = HD44780Lines::acquire(&gpio, &PINS).unwrap();
        let mut lcd = GpioHD44780Driver::new(lines, SimDelay::new(&gpio));
        lcd.initialize().unwrap();
        gpio.device_mut().take_transfers();

        update_row(&mut lcd, 3, &RowBuffer::text("lost")).unwrap();

        let sim = gpio.device();
        assert!(sim.transfers().iter().all(|t| t.register == Register::Data));
        assert_eq!(sim.transfers().len(), ROW_WIDTH);
        // The cursor was still home after initialization
        assert_eq!(sim.row_text(Row::One), "lost            ");
    }
}
