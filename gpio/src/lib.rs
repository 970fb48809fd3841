pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod raw;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("controller unresponsive after {0} busy polls")]
    Unresponsive(u32),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the GPIO line at the given index.
    ///
    /// A line can only be claimed once at a time; it is released when the returned handle is
    /// dropped.
    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>>;
}

/// Direction of a GPIO line.
///
/// Freshly claimed lines are inputs, so nothing gets driven until the user asks for it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioDirection {
    #[default] Input,
    Output,
}

/// Specifies the active level of the GPIO line.
///
/// By default, the active level is high.
///
/// Might be software-implemented.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioActiveLevel {
    #[default] High,
    Low,
}

impl GpioActiveLevel {
    /// Gets the real state of the line based on the active level and the logical value.
    ///
    /// The mapping is symmetric, so it converts physical levels back to logical ones too.
    pub fn get_state(&self, value: bool) -> bool {
        match self {
            GpioActiveLevel::High => value,
            GpioActiveLevel::Low => !value,
        }
    }
}

/// Specifies the bias of the GPIO line.
///
/// You can use this to enable pull-up or pull-down resistors.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// A single claimed GPIO line.
pub trait GpioLine: Debug {
    /// Gets the current direction of the line.
    fn direction(&self) -> GpioDirection;

    /// Switches the line between input and output.
    ///
    /// Switching to output drives the last level given to [GpioLine::set_level].
    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()>;

    /// Sets the output level of the line.
    ///
    /// The level is latched while the line is an input and driven once it becomes an output.
    fn set_level(&mut self, high: bool) -> GpioResult<()>;

    /// Reads the level of the line.
    fn read_level(&self) -> GpioResult<bool>;

    /// Latches `high` and switches the line to output, in that order, so the line never
    /// glitches to a stale level.
    fn set_output(&mut self, high: bool) -> GpioResult<()> {
        self.set_level(high)?;
        self.set_direction(GpioDirection::Output)
    }

    /// Gets whether the GPIO line supports active level.
    fn supports_active_level(&self) -> bool {
        false
    }
    /// Gets the active level of the GPIO line.
    fn active_level(&self) -> GpioActiveLevel {
        GpioActiveLevel::High
    }
    /// Sets the active level of the GPIO line.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the line does not support active level.
    fn set_active_level(&mut self, _level: GpioActiveLevel) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }

    /// Gets whether the GPIO line supports bias (pull-up/pull-down resistors).
    fn supports_bias(&self) -> bool {
        false
    }
    /// Gets the bias of the GPIO line.
    fn bias(&self) -> GpioBias {
        GpioBias::None
    }
    /// Sets the bias of the GPIO line.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the line does not support bias.
    fn set_bias(&mut self, _bias: GpioBias) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimGpioDriver;

    #[test]
    fn active_level_inverts_symmetrically() {
        assert!(GpioActiveLevel::High.get_state(true));
        assert!(!GpioActiveLevel::Low.get_state(true));
        assert!(GpioActiveLevel::Low.get_state(GpioActiveLevel::Low.get_state(true)));
    }

    #[test]
    fn set_output_latches_before_driving() {
        let gpio = SimGpioDriver::new(4);
        let mut line = gpio.get_line(2).unwrap();
        assert_eq!(line.direction(), GpioDirection::Input);

        line.set_output(true).unwrap();
        assert_eq!(line.direction(), GpioDirection::Output);
        assert!(line.read_level().unwrap());
        assert!(gpio.line_state(2).level);
    }

    #[test]
    fn default_capabilities_are_not_supported() {
        let gpio = SimGpioDriver::new(1);
        let mut line = gpio.get_line(0).unwrap();
        assert!(!line.supports_bias());
        assert_eq!(line.set_bias(GpioBias::PullUp), Err(GpioError::NotSupported));
        assert_eq!(line.set_active_level(GpioActiveLevel::Low), Err(GpioError::NotSupported));
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err: GpioError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err, GpioError::Io(std::io::ErrorKind::PermissionDenied));
    }
}
