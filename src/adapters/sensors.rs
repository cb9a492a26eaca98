//! Synthetic sensor feed.
//!
//! Implements [`SensorPort`] with a deterministic waveform for hosts
//! without light or climate hardware.  Sample `n` (taken every
//! `interval_ms`) reads:
//!
//! ```text
//! lux         = 500 + 150·sin(0.1·n)
//! temperature =  24 +   2·sin(0.05·n)
//! humidity    =  55 +   5·cos(0.05·n)
//! ```
//!
//! Only a lux value that differs from the previous sample is reported
//! as a new light reading.

use log::debug;

use crate::app::ports::{Climate, SensorPort};
use crate::error::SensorError;

pub struct SimulatedSensors {
    interval_ms: u64,
    next_sample_ms: u64,
    sample: u32,
    lux: Option<f32>,
    climate: Option<Climate>,
}

impl SimulatedSensors {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms: u64::from(interval_ms.max(1)),
            next_sample_ms: 0,
            sample: 0,
            lux: None,
            climate: None,
        }
    }

    /// Values of sample `n`: `(lux, climate)`.
    pub fn waveform(n: u32) -> (f32, Climate) {
        let n = n as f32;
        (
            500.0 + 150.0 * (0.1 * n).sin(),
            Climate {
                temperature_c: 24.0 + 2.0 * (0.05 * n).sin(),
                humidity_pct: 55.0 + 5.0 * (0.05 * n).cos(),
            },
        )
    }

    pub fn samples_taken(&self) -> u32 {
        self.sample
    }
}

impl SensorPort for SimulatedSensors {
    fn poll_light(&mut self, now_ms: u64) -> Option<f32> {
        if now_ms < self.next_sample_ms {
            return None;
        }
        self.next_sample_ms = now_ms + self.interval_ms;

        let (lux, climate) = Self::waveform(self.sample);
        self.sample = self.sample.wrapping_add(1);
        self.climate = Some(climate);

        let changed = self.lux != Some(lux);
        self.lux = Some(lux);
        if changed {
            debug!("Sensors: sample {} lux={:.1}", self.sample, lux);
            Some(lux)
        } else {
            None
        }
    }

    fn latest_lux(&self) -> Result<f32, SensorError> {
        self.lux.ok_or(SensorError::Unavailable)
    }

    fn latest_climate(&self) -> Result<Climate, SensorError> {
        self.climate.ok_or(SensorError::Unavailable)
    }
}
