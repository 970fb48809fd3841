//! Behavioral model of an HD44780 wired in 4-bit mode.
//!
//! [HD44780Sim] is a [SimDevice]: attach it to a [SimGpioDriver](crate::sim::SimGpioDriver) with
//! the same pin map as the driver under test. It latches nibbles on falling edges of E, answers
//! status reads, keeps DDRAM, and logs every completed transfer together with anything that would
//! upset a real controller.
use crate::lcd::hd44780::driver::{HD44780PinMap, Register, Row};
use crate::sim::{SimDevice, SimLineState};
use crate::GpioDirection;
use std::time::Duration;

/// How long after power-up the controller ignores the bus.
pub const POWER_UP_TIME: Duration = Duration::from_millis(40);
/// Execution time of most instructions and of data writes.
pub const EXECUTION_TIME: Duration = Duration::from_micros(37);
/// Execution time of clear display and return home.
pub const LONG_EXECUTION_TIME: Duration = Duration::from_micros(1520);

const DDRAM_SIZE: usize = 128;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusWidth {
    /// Power-up state; every strobe is a whole byte, of which only the upper nibble is wired.
    Eight,
    Four,
}

/// One byte the controller accepted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimTransfer {
    pub register: Register,
    /// In [BusWidth::Eight] the lower nibble is always zero.
    pub value: u8,
    /// Bus width the byte arrived in.
    pub width: BusWidth,
    /// Status reads completed since the previous transfer.
    pub status_reads: u32,
}

/// Something the host did that a real controller would not appreciate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimViolation {
    /// E strobed with the module powered down.
    Unpowered { at: Duration },
    /// Write strobe within [POWER_UP_TIME] of power-up.
    TooEarly { at: Duration },
    /// Byte written while the previous one was still executing.
    WriteWhileBusy { value: u8, at: Duration },
    /// Read strobe while the host was still driving D7.
    Contention { at: Duration },
}

#[derive(Debug)]
pub struct HD44780Sim {
    pins: HD44780PinMap,
    stuck_busy: bool,

    powered_since: Option<Duration>,
    e: bool,
    width: BusWidth,
    pending_nibble: Option<u8>,
    read_byte: u8,
    read_low_next: bool,
    busy_until: Duration,

    status_reads: u32,
    transfers: Vec<SimTransfer>,
    violations: Vec<SimViolation>,

    ddram: [u8; DDRAM_SIZE],
    address: u8,
    display_on: bool,
    increment: bool,
    two_lines: bool,
}

impl HD44780Sim {
    pub fn new(pins: HD44780PinMap) -> Self {
        HD44780Sim {
            pins,
            stuck_busy: false,
            powered_since: None,
            e: false,
            width: BusWidth::Eight,
            pending_nibble: None,
            read_byte: 0,
            read_low_next: false,
            busy_until: Duration::ZERO,
            status_reads: 0,
            transfers: Vec::new(),
            violations: Vec::new(),
            ddram: [b' '; DDRAM_SIZE],
            address: 0,
            display_on: false,
            increment: true,
            two_lines: false,
        }
    }

    /// Makes the controller report busy forever, like one that isn't there.
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    pub fn transfers(&self) -> &[SimTransfer] {
        &self.transfers
    }

    pub fn take_transfers(&mut self) -> Vec<SimTransfer> {
        std::mem::take(&mut self.transfers)
    }

    pub fn violations(&self) -> &[SimViolation] {
        &self.violations
    }

    pub fn is_powered(&self) -> bool {
        self.powered_since.is_some()
    }

    pub fn bus_width(&self) -> BusWidth {
        self.width
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn two_lines(&self) -> bool {
        self.two_lines
    }

    /// Whether the address counter moves right after a write.
    pub fn increments(&self) -> bool {
        self.increment
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn ddram(&self, address: u8) -> u8 {
        self.ddram[address as usize % DDRAM_SIZE]
    }

    /// The 16 visible characters of `row`.
    pub fn row_text(&self, row: Row) -> String {
        let base = row.base_address() as usize;
        self.ddram[base..base + 16].iter().map(|&c| c as char).collect()
    }

    fn is_busy(&self, now: Duration) -> bool {
        self.stuck_busy || now < self.busy_until
    }

    fn power_up(&mut self, now: Duration) {
        self.powered_since = Some(now);
        self.width = BusWidth::Eight;
        self.pending_nibble = None;
        self.read_low_next = false;
        self.busy_until = now;
        self.ddram.fill(b' ');
        self.address = 0;
        self.display_on = false;
        self.increment = true;
        self.two_lines = false;
    }

    fn data_nibble(&self, lines: &[SimLineState]) -> u8 {
        let mut nibble = 0;
        for (bit, &index) in self.pins.data.iter().enumerate() {
            if lines[index].level {
                nibble |= 0b10000000 >> bit;
            }
        }
        nibble
    }

    fn on_read_rise(&mut self, lines: &[SimLineState], now: Duration) {
        if lines[self.pins.data[0]].direction == GpioDirection::Output {
            self.violations.push(SimViolation::Contention { at: now });
        }
        if self.read_low_next {
            return;
        }
        self.read_byte = if lines[self.pins.rs].level {
            self.ddram(self.address)
        } else {
            let busy = if self.is_busy(now) { 0x80 } else { 0 };
            busy | (self.address & 0x7f)
        };
    }

    fn on_read_fall(&mut self) {
        if self.width == BusWidth::Four && !self.read_low_next {
            self.read_low_next = true;
            return;
        }
        self.read_low_next = false;
        self.status_reads += 1;
    }

    fn on_write_fall(&mut self, lines: &[SimLineState], now: Duration) {
        if let Some(since) = self.powered_since {
            if now < since + POWER_UP_TIME {
                self.violations.push(SimViolation::TooEarly { at: now });
            }
        }

        let nibble = self.data_nibble(lines);
        let register = if lines[self.pins.rs].level {
            Register::Data
        } else {
            Register::Instruction
        };

        match self.width {
            BusWidth::Eight => self.complete(register, nibble, BusWidth::Eight, now),
            BusWidth::Four => match self.pending_nibble.take() {
                Some(high) => self.complete(register, high | (nibble >> 4), BusWidth::Four, now),
                None => self.pending_nibble = Some(nibble),
            },
        }
    }

    fn complete(&mut self, register: Register, value: u8, width: BusWidth, now: Duration) {
        // The busy flag can't be read before 4-bit mode, so only fixed delays apply there
        if width == BusWidth::Four && self.is_busy(now) {
            self.violations.push(SimViolation::WriteWhileBusy { value, at: now });
        }

        self.transfers.push(SimTransfer {
            register,
            value,
            width,
            status_reads: self.status_reads,
        });
        self.status_reads = 0;

        let execution_time = match register {
            Register::Instruction => self.execute(value),
            Register::Data => {
                self.ddram[self.address as usize % DDRAM_SIZE] = value;
                self.step_address(self.increment);
                EXECUTION_TIME
            }
        };
        if width == BusWidth::Four {
            self.busy_until = now + execution_time;
        }
    }

    fn execute(&mut self, instruction: u8) -> Duration {
        match instruction.leading_zeros() {
            // Set DDRAM address
            0 => self.address = instruction & 0x7f,
            // Set CGRAM address, nothing to model
            1 => {}
            // Function set
            2 => {
                self.width = if instruction & 0x10 != 0 {
                    BusWidth::Eight
                } else {
                    BusWidth::Four
                };
                self.two_lines = instruction & 0x08 != 0;
                self.pending_nibble = None;
                self.read_low_next = false;
            }
            // Cursor or display shift; only the cursor is modelled
            3 => {
                if instruction & 0x08 == 0 {
                    self.step_address(instruction & 0x04 != 0);
                }
            }
            // Display on/off control
            4 => self.display_on = instruction & 0x04 != 0,
            // Entry mode set
            5 => self.increment = instruction & 0x02 != 0,
            // Return home
            6 => {
                self.address = 0;
                return LONG_EXECUTION_TIME;
            }
            // Clear display
            7 => {
                self.ddram.fill(b' ');
                self.address = 0;
                self.increment = true;
                return LONG_EXECUTION_TIME;
            }
            _ => {}
        }
        EXECUTION_TIME
    }

    fn step_address(&mut self, forward: bool) {
        self.address = match (forward, self.address) {
            (true, 0x27) => 0x40,
            (true, 0x67) => 0x00,
            (true, address) => (address + 1) & 0x7f,
            (false, 0x00) => 0x67,
            (false, 0x40) => 0x27,
            (false, address) => address - 1,
        };
    }
}

impl SimDevice for HD44780Sim {
    fn on_change(&mut self, lines: &[SimLineState], now: Duration) {
        let power = lines[self.pins.power];
        let powered = power.direction == GpioDirection::Output && power.level;
        match (powered, self.powered_since) {
            (true, None) => self.power_up(now),
            (false, Some(_)) => self.powered_since = None,
            _ => {}
        }

        let e = lines[self.pins.e];
        let e = e.direction == GpioDirection::Output && e.level;
        if e == self.e {
            return;
        }
        self.e = e;

        if !self.is_powered() {
            self.violations.push(SimViolation::Unpowered { at: now });
            return;
        }

        let reading = lines[self.pins.rw].level;
        match (e, reading) {
            (true, true) => self.on_read_rise(lines, now),
            (false, true) => self.on_read_fall(),
            (false, false) => self.on_write_fall(lines, now),
            (true, false) => {}
        }
    }

    fn drive(&self, index: usize, lines: &[SimLineState], _now: Duration) -> Option<bool> {
        if !self.is_powered() || !self.e || !lines[self.pins.rw].level {
            return None;
        }
        let bit = self.pins.data.iter().position(|&pin| pin == index)?;
        let nibble = if self.read_low_next {
            self.read_byte << 4
        } else {
            self.read_byte
        };
        Some(nibble & (0b10000000 >> bit) != 0)
    }
}
