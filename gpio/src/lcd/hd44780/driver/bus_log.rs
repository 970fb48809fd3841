//! Test device that logs every E strobe on the bus.
use crate::lcd::hd44780::driver::HD44780PinMap;
use crate::sim::{SimDevice, SimLineState};
use crate::GpioDirection;
use std::time::Duration;

pub(crate) const PINS: HD44780PinMap = HD44780PinMap {
    data: [7, 6, 5, 4],
    e: 3,
    rw: 0,
    rs: 1,
    power: 8,
};

/// Bus state latched on a falling edge of E.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Strobe {
    /// D7..D4 as bits 3..0.
    pub nibble: u8,
    pub rs: bool,
    pub rw: bool,
    pub d7_output: bool,
    pub at: Duration,
}

/// Logs every E edge and reports busy for a set number of status reads.
#[derive(Debug, Default)]
pub(crate) struct BusRecorder {
    pub(crate) e: bool,
    pub rises: Vec<Duration>,
    pub falls: Vec<Strobe>,
    pub busy_reads: u32,
}

impl SimDevice for BusRecorder {
    fn on_change(&mut self, lines: &[SimLineState], now: Duration) {
        let e = lines[PINS.e].level;
        if e && !self.e {
            self.rises.push(now);
        }
        if !e && self.e {
            let mut nibble = 0;
            for (bit, &index) in PINS.data.iter().enumerate() {
                if lines[index].level {
                    nibble |= 0b1000 >> bit;
                }
            }
            let rw = lines[PINS.rw].level;
            // Count whole status reads: two strobes each
            if rw && self.falls.iter().filter(|s| s.rw).count() % 2 == 1 {
                self.busy_reads = self.busy_reads.saturating_sub(1);
            }
            self.falls.push(Strobe {
                nibble,
                rs: lines[PINS.rs].level,
                rw,
                d7_output: lines[PINS.data[0]].direction == GpioDirection::Output,
                at: now,
            });
        }
        self.e = e;
    }

    fn drive(&self, index: usize, lines: &[SimLineState], _now: Duration) -> Option<bool> {
        let reading = lines[PINS.rw].level && lines[PINS.e].level;
        (index == PINS.data[0] && reading).then_some(self.busy_reads > 0)
    }
}
