//! Linux sysfs PWM adapter (channel 0 of one chip).
//!
//! Implements [`PwmPort`]:
//!
//! ```text
//! {chip}/export            ← "0"   (skipped if pwm0/ already exists)
//! {chip}/pwm0/period       ← period_ns
//! {chip}/pwm0/duty_cycle   ← period_ns × percent / 100
//! {chip}/pwm0/enable       ← "1"
//! ```
//!
//! The channel is set up lazily on the first duty-cycle write, so a
//! missing PWM chip only fails PWM commands.

use std::fs;
use std::path::PathBuf;

use log::{error, info};

use crate::app::ports::PwmPort;
use crate::error::ActuationError;

pub struct SysfsPwm {
    chip: PathBuf,
    period_ns: u32,
    ready: bool,
    duty: Option<u8>,
}

impl SysfsPwm {
    pub fn new(chip: impl Into<PathBuf>, period_ns: u32) -> Self {
        Self {
            chip: chip.into(),
            period_ns: period_ns.max(1),
            ready: false,
            duty: None,
        }
    }

    fn channel(&self) -> PathBuf {
        self.chip.join("pwm0")
    }

    fn write(&self, file: PathBuf, value: &str) -> Result<(), ActuationError> {
        fs::write(&file, value).map_err(|e| {
            error!("PWM: write {} to {} failed: {}", value, file.display(), e);
            ActuationError::PwmWriteFailed
        })
    }

    fn setup(&mut self) -> Result<(), ActuationError> {
        if !self.channel().exists() {
            fs::write(self.chip.join("export"), "0").map_err(|e| {
                error!("PWM: export on {} failed: {}", self.chip.display(), e);
                ActuationError::PwmUnavailable
            })?;
        }
        self.write(self.channel().join("period"), &self.period_ns.to_string())?;
        self.ready = true;
        info!("PWM: {} ready, period {} ns", self.chip.display(), self.period_ns);
        Ok(())
    }
}

/// Duty in nanoseconds for `percent` of `period_ns`.
pub fn duty_ns(period_ns: u32, percent: u8) -> u64 {
    u64::from(period_ns) * u64::from(percent.min(100)) / 100
}

impl PwmPort for SysfsPwm {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), ActuationError> {
        if percent > 100 {
            return Err(ActuationError::PwmWriteFailed);
        }
        if !self.ready {
            self.setup()?;
        }
        let ch = self.channel();
        self.write(ch.join("duty_cycle"), &duty_ns(self.period_ns, percent).to_string())?;
        self.write(ch.join("enable"), "1")?;
        self.duty = Some(percent);
        Ok(())
    }

    fn duty_cycle(&self) -> Option<u8> {
        self.duty
    }
}
