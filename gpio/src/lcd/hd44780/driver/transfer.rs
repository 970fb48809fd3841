use crate::lcd::hd44780::driver::{HD44780Lines, Register, TransferDirection};
use crate::{GpioDirection, GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{trace, warn};
use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

/// Time E spends in each phase of a strobe, in microseconds.
///
/// Covers data set-up (80 ns), enable pulse width (230 ns), data delay on reads (160 ns), hold
/// times (10 ns) and the whole enable cycle (500 ns).
pub const STROBE_PHASE_US: u32 = 1;

/// Moves nibbles over the bus and polls the busy flag. Knows nothing about instructions.
pub struct NibbleEngine<'a, D: DelayNs> {
    lines: HD44780Lines<'a>,
    delay: D,
    max_busy_polls: Option<NonZeroU32>,
}

impl<'a, D: DelayNs> NibbleEngine<'a, D> {
    pub fn new(lines: HD44780Lines<'a>, delay: D, max_busy_polls: Option<NonZeroU32>) -> Self {
        NibbleEngine {
            lines,
            delay,
            max_busy_polls,
        }
    }

    pub(crate) fn lines_mut(&mut self) -> &mut HD44780Lines<'a> {
        &mut self.lines
    }

    pub(crate) fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn select_register(&mut self, register: Register) -> GpioResult<()> {
        self.lines.rs.set_level(register.rs_level())
    }

    pub fn set_transfer_direction(&mut self, direction: TransferDirection) -> GpioResult<()> {
        self.lines.rw.set_level(direction.rw_level())
    }

    pub fn set_enable(&mut self, high: bool) -> GpioResult<()> {
        self.lines.e.set_level(high)
    }

    /// Latches the upper nibble of `value` into the controller.
    ///
    /// RS and RW must already be set and E must be low.
    pub fn send_nibble(&mut self, value: u8) -> GpioResult<()> {
        trace!("Writing nibble: {:04b}", value >> 4);
        self.lines.write_upper_nibble(value)?;

        self.set_enable(true)?;
        self.delay.delay_us(STROBE_PHASE_US);
        self.set_enable(false)?;
        self.delay.delay_us(STROBE_PHASE_US);
        Ok(())
    }

    /// One read strobe. Returns D7 sampled while E is high.
    fn read_strobe(&mut self) -> GpioResult<bool> {
        self.set_enable(true)?;
        self.delay.delay_us(STROBE_PHASE_US);
        let d7 = self.lines.d7().read_level()?;
        self.set_enable(false)?;
        self.delay.delay_us(STROBE_PHASE_US);
        Ok(d7)
    }

    /// Reads the status register until the busy flag is clear.
    ///
    /// Returns how many status reads it took. The bus is back in write mode with D7 as an output
    /// whenever this returns, error or not.
    pub fn poll_until_ready(&mut self) -> GpioResult<u32> {
        // D7 has to stop driving before the controller starts
        let polled = self
            .lines
            .d7()
            .set_direction(GpioDirection::Input)
            .and_then(|_| self.read_status_until_ready());

        // And the other way around on the way out
        let restored = self
            .set_transfer_direction(TransferDirection::Write)
            .and_then(|_| self.lines.d7().set_direction(GpioDirection::Output));

        let polls = polled?;
        restored?;
        Ok(polls)
    }

    fn read_status_until_ready(&mut self) -> GpioResult<u32> {
        self.select_register(Register::Instruction)?;
        self.set_transfer_direction(TransferDirection::Read)?;

        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);

            let busy = self.read_strobe()?;
            // The low nibble carries the address counter, which nobody here needs
            self.read_strobe()?;

            if !busy {
                trace!("Ready after {} polls", polls);
                return Ok(polls);
            }

            if self.max_busy_polls.is_some_and(|max| polls >= max.get()) {
                warn!("Controller still busy after {} polls", polls);
                return Err(GpioError::Unresponsive(polls));
            }
        }
    }
}

impl<D: DelayNs> Debug for NibbleEngine<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NibbleEngine")
            .field("lines", &self.lines)
            .field("max_busy_polls", &self.max_busy_polls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::driver::bus_log::{BusRecorder, PINS};
    use crate::sim::{SimDelay, SimGpioDriver};
    use std::time::Duration;

    fn engine<'a>(gpio: &'a SimGpioDriver<BusRecorder>, max: Option<u32>) -> NibbleEngine<'a, SimDelay<'a, BusRecorder>> {
        let mut lines = HD44780Lines::acquire(gpio, &PINS).unwrap();
        lines.configure_outputs().unwrap();
        NibbleEngine::new(lines, SimDelay::new(gpio), max.and_then(NonZeroU32::new))
    }

    #[test]
    fn send_nibble_strobes_once_with_upper_bits() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder::default());
        let mut engine = engine(&gpio, None);
        gpio.clear_delays();

        engine.send_nibble(0b1001_0110).unwrap();

        let bus = gpio.device();
        assert_eq!(bus.falls.len(), 1);
        assert_eq!(bus.falls[0].nibble, 0b1001);
        assert!(!bus.falls[0].rw);
        // E stays high for a full microsecond, then low for another one
        assert_eq!(bus.falls[0].at - bus.rises[0], Duration::from_micros(1));
        assert_eq!(gpio.delays(), [Duration::from_micros(1), Duration::from_micros(1)]);
        assert!(!gpio.line_state(PINS.e).level);
    }

    #[test]
    fn register_selection_drives_rs() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder::default());
        let mut engine = engine(&gpio, None);

        engine.select_register(Register::Data).unwrap();
        engine.send_nibble(0x40).unwrap();
        engine.select_register(Register::Instruction).unwrap();
        engine.send_nibble(0x80).unwrap();

        let rs: Vec<bool> = gpio.device().falls.iter().map(|s| s.rs).collect();
        assert_eq!(rs, [true, false]);
    }

    #[test]
    fn poll_reads_two_nibbles_per_status() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder::default());
        let mut engine = engine(&gpio, None);

        assert_eq!(engine.poll_until_ready().unwrap(), 1);

        let bus = gpio.device();
        assert_eq!(bus.falls.len(), 2);
        assert!(bus.falls.iter().all(|s| s.rw && !s.rs && !s.d7_output));
    }

    #[test]
    fn poll_spins_while_busy_and_restores_the_bus() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder { busy_reads: 5, ..BusRecorder::default() });
        let mut engine = engine(&gpio, None);

        assert_eq!(engine.poll_until_ready().unwrap(), 6);
        assert_eq!(gpio.device().falls.len(), 12);

        assert!(!gpio.line_state(PINS.rw).level);
        assert_eq!(gpio.line_state(PINS.data[0]).direction, GpioDirection::Output);
    }

    #[test]
    fn poll_gives_up_when_bounded() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder { busy_reads: u32::MAX, ..BusRecorder::default() });
        let mut engine = engine(&gpio, Some(3));

        assert_eq!(engine.poll_until_ready(), Err(GpioError::Unresponsive(3)));

        // Still back in write mode
        assert!(!gpio.line_state(PINS.rw).level);
        assert_eq!(gpio.line_state(PINS.data[0]).direction, GpioDirection::Output);
    }

    #[test]
    fn failed_turnaround_still_restores_the_bus() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder::default());
        let mut engine = engine(&gpio, None);
        gpio.set_input_fault(PINS.data[0], true);

        assert!(matches!(engine.poll_until_ready(), Err(GpioError::Other(_))));

        // Nothing was read, and D7 drives again
        assert!(gpio.device().falls.is_empty());
        assert!(!gpio.line_state(PINS.rw).level);
        assert_eq!(gpio.line_state(PINS.data[0]).direction, GpioDirection::Output);

        gpio.set_input_fault(PINS.data[0], false);
        assert_eq!(engine.poll_until_ready(), Ok(1));
    }

    #[test]
    fn nibble_after_poll_is_a_write() {
        let gpio = SimGpioDriver::with_device(9, BusRecorder { busy_reads: 2, ..BusRecorder::default() });
        let mut engine = engine(&gpio, None);

        engine.poll_until_ready().unwrap();
        engine.send_nibble(0xF0).unwrap();

        let bus = gpio.device();
        let last = bus.falls.last().unwrap();
        assert_eq!(last.nibble, 0xF);
        assert!(!last.rw);
        assert!(last.d7_output);
    }
}
