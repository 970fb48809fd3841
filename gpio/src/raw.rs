//! GPIO driver poking the BCM283x GPIO registers directly.
//!
//! The register block is mapped through `/dev/gpiomem` (no root needed on Raspberry Pi OS) or
//! `/dev/mem`. Every line operation is a single volatile register access, so nothing here can fail
//! once the mapping exists.
use crate::{GpioActiveLevel, GpioBias, GpioDirection, GpioDriver, GpioError, GpioLine, GpioResult};
use bitvec::vec::BitVec;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

// Register offsets, in bytes
const GPFSEL0: usize = 0x00;
const GPSET0: usize = 0x1c;
const GPCLR0: usize = 0x28;
const GPLEV0: usize = 0x34;
const GPIO_PUP_PDN_CNTRL_REG0: usize = 0xe4;

const FUNCTION_INPUT: u32 = 0b000;
const FUNCTION_OUTPUT: u32 = 0b001;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus; this is the ARM physical address on the Pi 2/3
    const GPIO_BASE: u32 = 0x3F200000;

    pub const PIN_COUNT: usize = 58;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(4096)
            .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    /// Maps the GPIO block through `/dev/gpiomem`, which already starts at the GPIO base.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block through `/dev/mem`. Needs root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn check_pin(pin_index: usize) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    fn register(&self, offset: usize) -> *mut u32 {
        let base = self.mmap.as_mut_ptr() as *mut u32;
        // SAFETY: every offset used in this file stays inside the 4 KiB mapping
        unsafe { base.add(offset / 4) }
    }

    pub(crate) fn raw_set_pin_function(&self, pin_index: usize, function: u32) -> GpioResult<()> {
        Self::check_pin(pin_index)?;
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        // GPFSELn register, 3 bits per pin
        let register = self.register(GPFSEL0 + (pin_index / 10) * 4);
        let shift = (pin_index % 10) * 3;

        // SAFETY: register points into the live mapping
        unsafe {
            let mut value = register.read_volatile();
            value &= !(0b111 << shift);
            value |= function << shift;
            register.write_volatile(value);
        }
        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        Self::check_pin(pin_index)?;

        // GPSETn/GPCLRn are write-1-to-act, no read-modify-write needed
        let base = if high { GPSET0 } else { GPCLR0 };
        let register = self.register(base + (pin_index / 32) * 4);

        // SAFETY: register points into the live mapping
        unsafe { register.write_volatile(1 << (pin_index % 32)) };
        Ok(())
    }

    pub(crate) fn raw_get_pin_level(&self, pin_index: usize) -> GpioResult<bool> {
        Self::check_pin(pin_index)?;

        let register = self.register(GPLEV0 + (pin_index / 32) * 4);

        // SAFETY: register points into the live mapping
        let value = unsafe { register.read_volatile() };
        Ok((value >> (pin_index % 32)) & 1 != 0)
    }

    pub(crate) fn raw_set_bias(&self, pin_index: usize, bias: GpioBias) -> GpioResult<()> {
        Self::check_pin(pin_index)?;

        let bias_value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };

        // GPIO_PUP_PDN_CNTRL_REGn register (yes that is a long name)
        let register = self.register(GPIO_PUP_PDN_CNTRL_REG0 + (pin_index / 16) * 4);
        let shift = (pin_index % 16) * 2;

        // SAFETY: register points into the live mapping
        unsafe {
            let mut value = register.read_volatile();
            value &= !(0b11 << shift);
            value |= bias_value << shift;
            register.write_volatile(value);
        }
        Ok(())
    }

    pub(crate) fn raw_get_bias(&self, pin_index: usize) -> GpioResult<GpioBias> {
        Self::check_pin(pin_index)?;

        let register = self.register(GPIO_PUP_PDN_CNTRL_REG0 + (pin_index / 16) * 4);
        let shift = (pin_index % 16) * 2;

        // SAFETY: register points into the live mapping
        let value = unsafe { register.read_volatile() };
        match (value >> shift) & 0b11 {
            0b00 => Ok(GpioBias::None),
            0b01 => Ok(GpioBias::PullUp),
            0b10 => Ok(GpioBias::PullDown),
            _ => Err(GpioError::NotSupported),
        }
    }

    pub(crate) fn raw_reset(&self, pin_index: usize) -> GpioResult<()> {
        self.raw_set_pin_function(pin_index, FUNCTION_INPUT)?;
        self.raw_set_bias(pin_index, GpioBias::None)?;
        self.raw_set_pin_output(pin_index, false)?;
        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        Self::check_pin(index)?;

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.raw_reset(index)?;
        self.used_pins.set_aliased(index, true);

        Ok(Box::new(RawGpioLine {
            driver: self,
            pin_index: index,
            direction: GpioDirection::Input,
            active_level: GpioActiveLevel::High,
        }))
    }
}

struct RawGpioLine<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
    direction: GpioDirection,
    active_level: GpioActiveLevel,
}

impl Debug for RawGpioLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][{:?}]", self.driver, self.pin_index, self.direction)
    }
}

impl GpioLine for RawGpioLine<'_> {
    fn direction(&self) -> GpioDirection {
        self.direction
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        let function = match direction {
            GpioDirection::Input => FUNCTION_INPUT,
            GpioDirection::Output => FUNCTION_OUTPUT,
        };
        self.driver.raw_set_pin_function(self.pin_index, function)?;
        self.direction = direction;
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> GpioResult<()> {
        // The output latch keeps its value while the pin is an input
        self.driver.raw_set_pin_output(self.pin_index, self.active_level.get_state(high))
    }

    fn read_level(&self) -> GpioResult<bool> {
        Ok(self.active_level.get_state(self.driver.raw_get_pin_level(self.pin_index)?))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.driver.raw_get_bias(self.pin_index).unwrap_or(GpioBias::None)
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.driver.raw_set_bias(self.pin_index, bias)
    }
}

impl Drop for RawGpioLine<'_> {
    fn drop(&mut self) {
        // Leave the pin floating so nothing keeps being driven after we're gone
        _ = self.driver.raw_set_pin_function(self.pin_index, FUNCTION_INPUT);
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}
