//! Hardware adapter: one value behind all three hardware ports.
//!
//! Owns the GPIO, PWM and sensor adapters and forwards
//! [`GpioPort`], [`PwmPort`] and [`SensorPort`] to them, so the service
//! can take a single `&mut (impl GpioPort + PwmPort + SensorPort)`.

use crate::app::ports::{Climate, GpioPort, PinDirection, PwmPort, SensorPort};
use crate::error::{ActuationError, SensorError};

use super::sensors::SimulatedSensors;
use super::sysfs_gpio::SysfsGpio;
use super::sysfs_pwm::SysfsPwm;

/// The host board: sysfs GPIO/PWM with the synthetic sensor feed.
pub type HostHardware = HardwareAdapter<SysfsGpio, SysfsPwm, SimulatedSensors>;

pub struct HardwareAdapter<G, P, S> {
    pub gpio: G,
    pub pwm: P,
    pub sensors: S,
}

impl<G, P, S> HardwareAdapter<G, P, S> {
    pub fn new(gpio: G, pwm: P, sensors: S) -> Self {
        Self { gpio, pwm, sensors }
    }
}

// ── GpioPort ──────────────────────────────────────────────────

impl<G: GpioPort, P, S> GpioPort for HardwareAdapter<G, P, S> {
    fn export_pin(&mut self, pin: u32) -> Result<(), ActuationError> {
        self.gpio.export_pin(pin)
    }

    fn set_direction(&mut self, pin: u32, direction: PinDirection) -> Result<(), ActuationError> {
        self.gpio.set_direction(pin, direction)
    }

    fn set_pin(&mut self, pin: u32, level: bool) -> Result<(), ActuationError> {
        self.gpio.set_pin(pin, level)
    }

    fn get_pin(&self, pin: u32) -> Result<bool, ActuationError> {
        self.gpio.get_pin(pin)
    }
}

// ── PwmPort ───────────────────────────────────────────────────

impl<G, P: PwmPort, S> PwmPort for HardwareAdapter<G, P, S> {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), ActuationError> {
        self.pwm.set_duty_cycle(percent)
    }

    fn duty_cycle(&self) -> Option<u8> {
        self.pwm.duty_cycle()
    }
}

// ── SensorPort ────────────────────────────────────────────────

impl<G, P, S: SensorPort> SensorPort for HardwareAdapter<G, P, S> {
    fn poll_light(&mut self, now_ms: u64) -> Option<f32> {
        self.sensors.poll_light(now_ms)
    }

    fn latest_lux(&self) -> Result<f32, SensorError> {
        self.sensors.latest_lux()
    }

    fn latest_climate(&self) -> Result<Climate, SensorError> {
        self.sensors.latest_climate()
    }
}

impl HostHardware {
    /// Wire the host adapters from the hardware section of the config.
    pub fn from_config(cfg: &crate::config::HardwareConfig) -> Self {
        Self::new(
            SysfsGpio::new(&cfg.gpio_root),
            SysfsPwm::new(&cfg.pwm_chip, cfg.pwm_period_ns),
            SimulatedSensors::new(cfg.sensor_interval_ms),
        )
    }
}
