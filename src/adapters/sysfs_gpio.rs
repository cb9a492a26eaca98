//! Linux sysfs GPIO adapter.
//!
//! Implements [`GpioPort`] on the legacy `/sys/class/gpio` interface:
//!
//! ```text
//! {root}/export            ← "N"
//! {root}/gpioN/direction   ← "in" | "out"
//! {root}/gpioN/value       ← "0" | "1"
//! ```
//!
//! The root is configurable so tests can point it at a temporary
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::app::ports::{GpioPort, PinDirection};
use crate::error::ActuationError;

pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }
}

impl GpioPort for SysfsGpio {
    fn export_pin(&mut self, pin: u32) -> Result<(), ActuationError> {
        if self.pin_dir(pin).exists() {
            debug!("GPIO: {} already exported", pin);
            return Ok(());
        }
        fs::write(self.root.join("export"), pin.to_string()).map_err(|e| {
            error!("GPIO: export {} failed: {}", pin, e);
            ActuationError::ExportFailed { pin }
        })
    }

    fn set_direction(&mut self, pin: u32, direction: PinDirection) -> Result<(), ActuationError> {
        fs::write(self.pin_dir(pin).join("direction"), direction.as_str()).map_err(|e| {
            error!("GPIO: direction {} failed: {}", pin, e);
            ActuationError::DirectionFailed { pin }
        })
    }

    fn set_pin(&mut self, pin: u32, level: bool) -> Result<(), ActuationError> {
        let value = if level { "1" } else { "0" };
        fs::write(self.pin_dir(pin).join("value"), value).map_err(|e| {
            error!("GPIO: write {}={} failed: {}", pin, value, e);
            ActuationError::WriteFailed { pin }
        })
    }

    fn get_pin(&self, pin: u32) -> Result<bool, ActuationError> {
        let raw = fs::read_to_string(self.pin_dir(pin).join("value"))
            .map_err(|_| ActuationError::ReadFailed { pin })?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(ActuationError::ReadFailed { pin }),
        }
    }
}
