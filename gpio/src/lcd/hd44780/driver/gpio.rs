use crate::lcd::hd44780::driver::{
    instruction, HD44780Driver, HD44780Lines, HD44780Options, NibbleEngine, Register, TransferDirection,
    MIN_BUSY_POLLS,
};
use crate::GpioResult;
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

/// Time the module needs after power-up before it accepts anything.
pub const POWER_UP_DELAY_MS: u32 = 50;
/// Waits after each of the three reset nibbles, in microseconds.
pub const RESET_DELAYS_US: [u32; 3] = [10, 200, 80];

/// Sent, with polling, once the controller is in 4-bit mode.
const INIT_INSTRUCTIONS: [u8; 5] = [
    instruction::FUNCTION_SET_4BIT,
    instruction::DISPLAY_OFF,
    instruction::CLEAR,
    instruction::ENTRY_MODE,
    instruction::DISPLAY_ON,
];

/// HD44780 on a 4-bit bus made of individual GPIO lines, with RW wired so the busy flag can be
/// read back.
pub struct GpioHD44780Driver<'a, D: DelayNs> {
    engine: NibbleEngine<'a, D>,
}

impl<'a, D: DelayNs> GpioHD44780Driver<'a, D> {
    pub fn new(lines: HD44780Lines<'a>, delay: D) -> Self {
        Self::with_options(lines, delay, HD44780Options::default())
    }

    pub fn with_options(lines: HD44780Lines<'a>, delay: D, options: HD44780Options) -> Self {
        let max_busy_polls = options.max_busy_polls.map(|max| {
            if max.get() >= MIN_BUSY_POLLS {
                return max;
            }
            warn!("Poll bound {} is too small for clear and home, using {}", max, MIN_BUSY_POLLS);
            NonZeroU32::new(MIN_BUSY_POLLS).unwrap_or(max)
        });

        GpioHD44780Driver {
            engine: NibbleEngine::new(lines, delay, max_busy_polls),
        }
    }

    fn write_byte(&mut self, register: Register, value: u8) -> GpioResult<()> {
        trace!("Writing {:?}: {:08b}", register, value);
        self.engine.select_register(register)?;
        self.engine.set_transfer_direction(TransferDirection::Write)?;
        self.engine.set_enable(false)?;

        self.engine.send_nibble(value)?;
        self.engine.send_nibble(value << 4)
    }
}

impl<D: DelayNs> Debug for GpioHD44780Driver<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioHD44780Driver")
            .field("engine", &self.engine)
            .finish()
    }
}

impl<D: DelayNs> HD44780Driver for GpioHD44780Driver<'_, D> {
    fn initialize(&mut self) -> GpioResult<()> {
        debug!("Initializing HD44780 in 4-bit mode");
        self.engine.lines_mut().configure_outputs()?;
        self.set_power(true)?;
        self.engine.delay_mut().delay_ms(POWER_UP_DELAY_MS);

        self.engine.select_register(Register::Instruction)?;
        self.engine.set_transfer_direction(TransferDirection::Write)?;
        self.engine.set_enable(false)?;

        // Whatever mode it's in, three of these leave the controller in 8-bit mode
        for delay_us in RESET_DELAYS_US {
            self.engine.send_nibble(instruction::FUNCTION_RESET)?;
            self.engine.delay_mut().delay_us(delay_us);
        }
        // Still 8-bit, so this single nibble is a whole instruction
        self.engine.send_nibble(instruction::FUNCTION_SET_4BIT)?;

        for instruction in INIT_INSTRUCTIONS {
            self.poll_until_ready()?;
            self.write_instruction(instruction)?;
        }
        debug!("HD44780 initialized");
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> GpioResult<()> {
        debug!("Switching HD44780 power {}", if on { "on" } else { "off" });
        self.engine.lines_mut().power.set_output(on)
    }

    fn poll_until_ready(&mut self) -> GpioResult<()> {
        self.engine.poll_until_ready().map(|_| ())
    }

    fn write_instruction(&mut self, instruction: u8) -> GpioResult<()> {
        self.write_byte(Register::Instruction, instruction)
    }

    fn write_character(&mut self, character: u8) -> GpioResult<()> {
        self.write_byte(Register::Data, character)
    }
}
