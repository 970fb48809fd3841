//! GpiodDriver implementation for managing GPIO lines using the Linux GPIO character device.
//!
//! The kernel ties the direction of a line to its request, so switching direction releases the
//! request and makes a new one. That is slower than the [raw](crate::raw) backend but works on any
//! board with a `/dev/gpiochipN`.
use crate::{GpioActiveLevel, GpioBias, GpioDirection, GpioDriver, GpioError, GpioLine, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO lines.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_lines: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            used_lines: BitVec::repeat(false, n),
        }
    }

    /// Opens the chip at `path`, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path.as_ref())?))
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_lines[index] {
            return Err(GpioError::AlreadyInUse);
        }

        let mut line = GpiodLine {
            driver: self,
            line_index: index,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
            level: false,
            request: GpiodRequest::Released,
        };
        line.request(GpioDirection::Input)?;
        self.used_lines.set_aliased(index, true);

        Ok(Box::new(line))
    }
}

impl From<GpioActiveLevel> for gpiod::Active {
    fn from(level: GpioActiveLevel) -> Self {
        match level {
            GpioActiveLevel::High => gpiod::Active::High,
            GpioActiveLevel::Low => gpiod::Active::Low,
        }
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

enum GpiodRequest {
    Released,
    Input(gpiod::Lines<gpiod::Input>),
    Output(gpiod::Lines<gpiod::Output>),
}

struct GpiodLine<'a> {
    driver: &'a GpiodDriver,
    line_index: usize,
    active_level: GpioActiveLevel,
    bias: GpioBias,
    /// Output latch; the character device has none while the line is requested as an input.
    level: bool,
    request: GpiodRequest,
}

impl GpiodLine<'_> {
    fn request(&mut self, direction: GpioDirection) -> GpioResult<()> {
        // The old request has to go before the line can be requested again
        self.request = GpiodRequest::Released;

        let offset = [self.line_index as u32];
        self.request = match direction {
            GpioDirection::Input => GpiodRequest::Input(self.driver.chip.request_lines(
                gpiod::Options::input(offset)
                    .consumer(env!("CARGO_PKG_NAME"))
                    .active(self.active_level.into())
                    .bias(self.bias.into()),
            )?),
            GpioDirection::Output => {
                let lines = self.driver.chip.request_lines(
                    gpiod::Options::output(offset)
                        .consumer(env!("CARGO_PKG_NAME"))
                        .active(self.active_level.into())
                        .bias(self.bias.into()),
                )?;
                lines.set_values([self.level])?;
                GpiodRequest::Output(lines)
            }
        };
        trace!("{:?} requested", self);
        Ok(())
    }
}

impl Debug for GpiodLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][{:?}]", self.driver, self.line_index, self.direction())
    }
}

impl GpioLine for GpiodLine<'_> {
    fn direction(&self) -> GpioDirection {
        match self.request {
            GpiodRequest::Output(_) => GpioDirection::Output,
            _ => GpioDirection::Input,
        }
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        if direction == self.direction() && !matches!(self.request, GpiodRequest::Released) {
            return Ok(());
        }
        self.request(direction)
    }

    fn set_level(&mut self, high: bool) -> GpioResult<()> {
        self.level = high;
        if let GpiodRequest::Output(lines) = &self.request {
            lines.set_values([high])?;
        }
        Ok(())
    }

    fn read_level(&self) -> GpioResult<bool> {
        match &self.request {
            GpiodRequest::Input(lines) => {
                let values = lines.get_values([false])?;
                Ok(values[0])
            }
            GpiodRequest::Output(_) => Ok(self.level),
            GpiodRequest::Released => Err(GpioError::Other("line is not requested".to_string())),
        }
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        // Active level is part of the request
        self.request(self.direction())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        self.request(self.direction())
    }
}

impl Drop for GpiodLine<'_> {
    fn drop(&mut self) {
        self.request = GpiodRequest::Released;
        self.driver.used_lines.set_aliased(self.line_index, false);
    }
}
