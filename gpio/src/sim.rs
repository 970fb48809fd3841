//! In-memory GPIO backend with a simulated clock.
//!
//! Lines live in a shared table instead of hardware registers. A [SimDevice] can be attached to
//! watch the lines and drive the ones the host switched to input, which is how the LCD drivers are
//! exercised without a display. Time only moves when a [SimDelay] is used.
use crate::{GpioDirection, GpioDriver, GpioError, GpioLine, GpioResult};
use bitvec::vec::BitVec;
use embedded_hal::delay::DelayNs;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Host-side state of one simulated line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimLineState {
    pub direction: GpioDirection,
    /// The output latch, driven onto the line while it is an output.
    pub level: bool,
}

/// A peripheral attached to the simulated lines.
pub trait SimDevice: Debug {
    /// Called after the host changed the level or direction of any line.
    fn on_change(&mut self, lines: &[SimLineState], now: Duration);

    /// Level the device drives onto the line at `index`, or `None` if it leaves the line alone.
    fn drive(&self, index: usize, lines: &[SimLineState], now: Duration) -> Option<bool>;
}

impl SimDevice for () {
    fn on_change(&mut self, _lines: &[SimLineState], _now: Duration) {}

    fn drive(&self, _index: usize, _lines: &[SimLineState], _now: Duration) -> Option<bool> {
        None
    }
}

struct SimState<D> {
    lines: Vec<SimLineState>,
    used_lines: BitVec,
    failing_inputs: BitVec,
    now: Duration,
    delays: Vec<Duration>,
    device: D,
}

/// GPIO driver whose lines only exist in memory.
pub struct SimGpioDriver<D: SimDevice = ()> {
    state: RefCell<SimState<D>>,
}

impl SimGpioDriver {
    /// Creates a simulated chip with `count` lines and nothing attached to them.
    pub fn new(count: usize) -> Self {
        Self::with_device(count, ())
    }
}

impl<D: SimDevice> SimGpioDriver<D> {
    /// Creates a simulated chip with `count` lines and `device` attached to them.
    pub fn with_device(count: usize, device: D) -> Self {
        SimGpioDriver {
            state: RefCell::new(SimState {
                lines: vec![SimLineState::default(); count],
                used_lines: BitVec::repeat(false, count),
                failing_inputs: BitVec::repeat(false, count),
                now: Duration::ZERO,
                delays: Vec::new(),
                device,
            }),
        }
    }

    pub fn device(&self) -> Ref<'_, D> {
        Ref::map(self.state.borrow(), |state| &state.device)
    }

    pub fn device_mut(&self) -> RefMut<'_, D> {
        RefMut::map(self.state.borrow_mut(), |state| &mut state.device)
    }

    /// Host-side state of the line at `index`.
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn line_state(&self, index: usize) -> SimLineState {
        self.state.borrow().lines[index]
    }

    /// Simulated time elapsed since the chip was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Every delay requested through a [SimDelay] so far, oldest first.
    pub fn delays(&self) -> Vec<Duration> {
        self.state.borrow().delays.clone()
    }

    /// Forgets the recorded delays.
    pub fn clear_delays(&self) {
        self.state.borrow_mut().delays.clear();
    }

    /// Makes switching the line at `index` to input fail.
    ///
    /// The line still floats afterwards, like a gpiod line whose re-request was refused.
    pub fn set_input_fault(&self, index: usize, failing: bool) {
        self.state.borrow_mut().failing_inputs.set(index, failing);
    }

    fn advance(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.now += duration;
        state.delays.push(duration);
    }

    fn update_line(&self, index: usize, update: impl FnOnce(&mut SimLineState)) {
        let mut state = self.state.borrow_mut();
        let SimState { lines, now, device, .. } = &mut *state;
        update(&mut lines[index]);
        device.on_change(lines, *now);
    }

    fn read_line(&self, index: usize) -> bool {
        let state = self.state.borrow();
        let line = state.lines[index];
        match line.direction {
            GpioDirection::Output => line.level,
            GpioDirection::Input => state
                .device
                .drive(index, &state.lines, state.now)
                .unwrap_or(false),
        }
    }
}

impl<D: SimDevice> Debug for SimGpioDriver<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => write!(f, "SimGpioDriver({} lines @ {:?})", state.lines.len(), state.now),
            Err(_) => write!(f, "SimGpioDriver(<busy>)"),
        }
    }
}

impl<D: SimDevice> GpioDriver for SimGpioDriver<D> {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.state.borrow().lines.len())
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        let mut state = self.state.borrow_mut();
        if index >= state.lines.len() {
            return Err(GpioError::InvalidArgument);
        }
        if state.used_lines[index] {
            return Err(GpioError::AlreadyInUse);
        }
        state.used_lines.set(index, true);
        state.lines[index] = SimLineState::default();

        Ok(Box::new(SimLine { driver: self, index }))
    }
}

struct SimLine<'a, D: SimDevice> {
    driver: &'a SimGpioDriver<D>,
    index: usize,
}

impl<D: SimDevice> Debug for SimLine<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.index)
    }
}

impl<D: SimDevice> GpioLine for SimLine<'_, D> {
    fn direction(&self) -> GpioDirection {
        self.driver.line_state(self.index).direction
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        self.driver.update_line(self.index, |line| line.direction = direction);
        if direction == GpioDirection::Input && self.driver.state.borrow().failing_inputs[self.index] {
            return Err(GpioError::Other(format!("line {} refused to become an input", self.index)));
        }
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> GpioResult<()> {
        self.driver.update_line(self.index, |line| line.level = high);
        Ok(())
    }

    fn read_level(&self) -> GpioResult<bool> {
        Ok(self.driver.read_line(self.index))
    }
}

impl<D: SimDevice> Drop for SimLine<'_, D> {
    fn drop(&mut self) {
        let mut state = self.driver.state.borrow_mut();
        state.used_lines.set(self.index, false);
    }
}

/// Delay that advances the clock of a [SimGpioDriver] instead of sleeping.
pub struct SimDelay<'a, D: SimDevice = ()> {
    driver: &'a SimGpioDriver<D>,
}

impl<'a, D: SimDevice> SimDelay<'a, D> {
    pub fn new(driver: &'a SimGpioDriver<D>) -> Self {
        SimDelay { driver }
    }
}

impl<D: SimDevice> Clone for SimDelay<'_, D> {
    fn clone(&self) -> Self {
        SimDelay { driver: self.driver }
    }
}

impl<D: SimDevice> Debug for SimDelay<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDelay({:?})", self.driver)
    }
}

impl<D: SimDevice> DelayNs for SimDelay<'_, D> {
    fn delay_ns(&mut self, ns: u32) {
        self.driver.advance(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        self.driver.advance(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.driver.advance(Duration::from_millis(ms.into()));
    }
}
