#[cfg(test)]
pub(crate) mod bus_log;
mod gpio;
mod lines;
mod transfer;

use crate::{GpioError, GpioResult};
pub use gpio::*;
pub use lines::*;
use std::fmt::Debug;
use std::num::NonZeroU32;
pub use transfer::*;

/// Instruction opcodes used by this driver.
pub mod instruction {
    /// Replaces every character with a space and moves the cursor home.
    pub const CLEAR: u8 = 0b00000001;
    /// Moves the cursor to the first position of the first line.
    pub const HOME: u8 = 0b00000010;
    /// Cursor moves left to right after each write, no display shift.
    pub const ENTRY_MODE: u8 = 0b00000110;
    pub const DISPLAY_OFF: u8 = 0b00001000;
    /// Display on, cursor off, no blinking.
    pub const DISPLAY_ON: u8 = 0b00001100;
    /// Forces 8-bit mode whatever state the controller is in. Only the upper nibble is sent.
    pub const FUNCTION_RESET: u8 = 0b00110000;
    /// 4-bit data, 2 lines, 5x8 font.
    pub const FUNCTION_SET_4BIT: u8 = 0b00101000;
    /// Sets the DDRAM address; OR the address into the low 7 bits.
    pub const SET_CURSOR: u8 = 0b10000000;
}

/// Which controller register a transfer targets (the RS line).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Register {
    /// RS low.
    Instruction,
    /// RS high.
    Data,
}

impl Register {
    pub fn rs_level(self) -> bool {
        self == Register::Data
    }
}

/// Direction of a transfer (the RW line).
///
/// The bus is only ever in [TransferDirection::Read] while the driver polls the busy flag.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TransferDirection {
    /// RW low.
    #[default] Write,
    /// RW high.
    Read,
}

impl TransferDirection {
    pub fn rw_level(self) -> bool {
        self == TransferDirection::Read
    }
}

/// One of the two rows of a 16x2 display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Row {
    One,
    Two,
}

impl Row {
    /// DDRAM address of the first character of the row.
    pub fn base_address(self) -> u8 {
        match self {
            Row::One => 0x00,
            Row::Two => 0x40,
        }
    }
}

impl TryFrom<u8> for Row {
    type Error = GpioError;

    /// Converts a 1-based row number.
    fn try_from(row: u8) -> GpioResult<Self> {
        match row {
            1 => Ok(Row::One),
            2 => Ok(Row::Two),
            _ => Err(GpioError::InvalidArgument),
        }
    }
}

/// Smallest poll bound [GpioHD44780Driver] accepts.
///
/// One status read takes at least 4 µs (two strobes, E high and low for 1 µs each), while clear
/// and return home keep the controller busy for 1.52 ms, i.e. about 380 reads. Lower bounds would
/// turn a healthy display into [GpioError::Unresponsive].
pub const MIN_BUSY_POLLS: u32 = 1000;

/// Options for [GpioHD44780Driver].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HD44780Options {
    /// Upper bound on busy-flag polls before giving up with [GpioError::Unresponsive].
    ///
    /// Counts status reads, not time. Anything below [MIN_BUSY_POLLS] is raised to it.
    ///
    /// `None` polls forever, which is what you want on real hardware: the controller always
    /// finishes eventually, unless it's not there at all.
    pub max_busy_polls: Option<NonZeroU32>,
}

pub trait HD44780Driver: Debug {
    /// Powers the controller up and runs the 4-bit initialization sequence.
    ///
    /// Leaves the display on and cleared, with the cursor moving left to right. Running it again
    /// resets the controller to the same state.
    fn initialize(&mut self) -> GpioResult<()>;

    /// Switches the power line of the module.
    fn set_power(&mut self, on: bool) -> GpioResult<()>;

    fn power_on(&mut self) -> GpioResult<()> {
        self.set_power(true)
    }

    /// Cuts power to the module. It forgets everything and needs [HD44780Driver::initialize]
    /// again afterwards.
    fn power_off(&mut self) -> GpioResult<()> {
        self.set_power(false)
    }

    /// Blocks until the controller clears its busy flag.
    fn poll_until_ready(&mut self) -> GpioResult<()>;

    /// Writes a byte to the instruction register.
    ///
    /// Doesn't wait for the controller; call [HD44780Driver::poll_until_ready] first.
    fn write_instruction(&mut self, instruction: u8) -> GpioResult<()>;

    /// Writes a byte to the data register, i.e. puts a character at the cursor.
    ///
    /// Doesn't wait for the controller; call [HD44780Driver::poll_until_ready] first.
    fn write_character(&mut self, character: u8) -> GpioResult<()>;

    /// Writes characters until the first NUL byte or the end of `bytes`, waiting for the
    /// controller before each one.
    fn write_string(&mut self, bytes: &[u8]) -> GpioResult<()> {
        for &byte in bytes.iter().take_while(|&&byte| byte != 0) {
            self.poll_until_ready()?;
            self.write_character(byte)?;
        }
        Ok(())
    }

    /// Moves the cursor to the start of `row`.
    fn set_cursor(&mut self, row: Row) -> GpioResult<()> {
        self.poll_until_ready()?;
        self.write_instruction(instruction::SET_CURSOR | row.base_address())
    }

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.poll_until_ready()?;
        self.write_instruction(instruction::CLEAR)
    }

    /// Sets the cursor to the home position.
    fn return_home(&mut self) -> GpioResult<()> {
        self.poll_until_ready()?;
        self.write_instruction(instruction::HOME)
    }
}
