//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (GPIO, PWM, sensor feeds, clocks, event sinks, config
//! storage) implement these traits.  The [`AppService`](super::service::AppService)
//! consumes them via generics at call sites, so the domain core never
//! owns or touches hardware directly.
//!
//! The broker byte stream has its own port,
//! [`Transport`](crate::mqtt::transport::Transport), next to the client
//! that drives it.

use crate::config::SystemConfig;
use crate::error::{ActuationError, SensorError};

// ───────────────────────────────────────────────────────────────
// GPIO port (driven adapter: domain → pins)
// ───────────────────────────────────────────────────────────────

/// Pin direction as understood by the kernel GPIO interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    In,
    Out,
}

impl PinDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Digital I/O lines.  Implementations do file or register I/O only;
/// they hold no curtain logic.
pub trait GpioPort {
    /// Make `pin` available for use.  Idempotent.
    fn export_pin(&mut self, pin: u32) -> Result<(), ActuationError>;

    fn set_direction(&mut self, pin: u32, direction: PinDirection) -> Result<(), ActuationError>;

    /// Drive `pin` to `level` (true = HIGH).
    fn set_pin(&mut self, pin: u32, level: bool) -> Result<(), ActuationError>;

    /// Read back the current level of `pin`.
    fn get_pin(&self, pin: u32) -> Result<bool, ActuationError>;
}

// ───────────────────────────────────────────────────────────────
// PWM port (driven adapter: domain → fan / light dimmer)
// ───────────────────────────────────────────────────────────────

pub trait PwmPort {
    /// Set the duty cycle in percent (0–100).
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), ActuationError>;

    /// Last duty cycle successfully applied, if any.
    fn duty_cycle(&self) -> Option<u8>;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: feeds → domain)
// ───────────────────────────────────────────────────────────────

/// Air temperature and relative humidity from the climate sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Read-side port for the light and climate feeds.
///
/// A feed that is permanently unavailable is legal: the domain substitutes
/// defaults rather than failing.
pub trait SensorPort {
    /// A lux sample that arrived since the previous call, if any.
    /// Repeated identical samples are not reported again.
    fn poll_light(&mut self, now_ms: u64) -> Option<f32>;

    /// Most recent lux value.
    fn latest_lux(&self) -> Result<f32, SensorError>;

    /// Most recent temperature / humidity pair.
    fn latest_climate(&self) -> Result<Climate, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Monotonic milliseconds; drives every timer in the core.
    fn monotonic_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch; used for message ids
    /// and timestamps only.
    fn epoch_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / observers)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port, synchronously and in the order they happen.
/// Adapters decide where they go (log output, UI bridge, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate values before persisting; invalid ranges
/// are rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No stored config exists.
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
