//! Telemetry snapshot assembly.
//!
//! A [`DeviceData`] is built fresh for every report, published once, and
//! dropped.  Sensors that are unavailable or out of range never fail a
//! report: the aggregator substitutes the last valid reading, or a fixed
//! default if there has never been one.

use log::{debug, warn};

use crate::app::ports::{PwmPort, SensorPort};
use crate::curtain::{CurtainController, CurtainType};

pub const DEFAULT_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_HUMIDITY_PCT: f64 = 50.0;
pub const DEFAULT_LIGHT_LUX: f64 = 500.0;
pub const DEFAULT_PWM_DUTY: u8 = 50;

/// One telemetry report.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceData {
    pub temperature: f64,
    pub humidity: f64,
    pub light_intensity: f64,
    /// 0..=100.
    pub pwm_duty_cycle: u8,
    pub curtain_top_open: bool,
    pub curtain_side_open: bool,
    /// Wall-clock milliseconds.
    pub timestamp_ms: u64,
    /// False when the snapshot must not be published (no wall-clock time).
    pub valid: bool,
}

fn temperature_ok(t: f64) -> bool {
    t > -50.0 && t < 100.0
}

fn humidity_ok(h: f64) -> bool {
    h > 0.0 && h <= 100.0
}

fn lux_ok(l: f64) -> bool {
    l.is_finite() && l >= 0.0
}

#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    last_temperature: Option<f64>,
    last_humidity: Option<f64>,
    last_lux: Option<f64>,
    last_pwm: Option<u8>,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(
        &mut self,
        sensors: &impl SensorPort,
        pwm: &impl PwmPort,
        curtains: &CurtainController,
        timestamp_ms: u64,
    ) -> DeviceData {
        let (temperature, humidity) = match sensors.latest_climate() {
            Ok(climate) => (
                Some(f64::from(climate.temperature_c)).filter(|t| temperature_ok(*t)),
                Some(f64::from(climate.humidity_pct)).filter(|h| humidity_ok(*h)),
            ),
            Err(e) => {
                warn!("Telemetry: climate sensor: {}", e);
                (None, None)
            }
        };
        let lux = match sensors.latest_lux() {
            Ok(l) => Some(f64::from(l)).filter(|l| lux_ok(*l)),
            Err(e) => {
                warn!("Telemetry: light sensor: {}", e);
                None
            }
        };
        let duty = pwm.duty_cycle().filter(|d| *d <= 100);

        let temperature = pick(&mut self.last_temperature, temperature, DEFAULT_TEMPERATURE_C);
        let humidity = pick(&mut self.last_humidity, humidity, DEFAULT_HUMIDITY_PCT);
        let light_intensity = pick(&mut self.last_lux, lux, DEFAULT_LIGHT_LUX);
        let pwm_duty_cycle = pick(&mut self.last_pwm, duty, DEFAULT_PWM_DUTY);

        // A zero stamp means the wall clock could not be read.
        let valid = timestamp_ms > 0;
        if !valid {
            warn!("Telemetry: no wall-clock time, snapshot marked invalid");
        }

        let data = DeviceData {
            temperature,
            humidity,
            light_intensity,
            pwm_duty_cycle,
            curtain_top_open: curtains.is_open(CurtainType::Top),
            curtain_side_open: curtains.is_open(CurtainType::Side),
            timestamp_ms,
            valid,
        };
        debug!("Telemetry: {:?}", data);
        data
    }
}

/// Fresh value if present (remembered), else last valid, else default.
fn pick<T: Copy>(last: &mut Option<T>, fresh: Option<T>, default: T) -> T {
    if fresh.is_some() {
        *last = fresh;
    }
    last.unwrap_or(default)
}
