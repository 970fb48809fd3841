//! HD44780 LCD module, driven over a 4-bit data bus.
//!
//! [driver] talks to a real controller through any [GpioDriver](crate::GpioDriver);
//! [sim] is a model of the controller that can be attached to the
//! [simulated GPIO backend](crate::sim) to run the driver without hardware.
pub mod driver;
pub mod sim;
