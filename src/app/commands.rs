//! Inbound commands to the application service.
//!
//! [`ControlCommand`] is what the MQTT client hands over when a generic
//! `{"method": …, "params": {…}}` message arrives.  The dispatcher only
//! understands a handful of `params` keys; [`CommandParams`] extracts them
//! and ignores everything else.

use serde_json::{Map, Value};

use crate::curtain::CurtainType;

/// Cloud control command, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCommand {
    /// The message `method`, e.g. `thing.service.property.set`.
    pub command_type: String,
    pub parameters: Map<String, Value>,
    /// The message `id` (empty if absent).
    pub message_id: String,
    /// Wall-clock receive time, ms since the Unix epoch.
    pub received_at_ms: u64,
}

// ── Recognised parameters ─────────────────────────────────────

const KEY_PWM: &str = "pwmDutyCycle";
const KEY_TOP: &str = "curtainTopOpen";
const KEY_SIDE: &str = "curtainSideOpen";

/// The subset of `params` the dispatcher acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandParams {
    /// Raw requested duty; range-checked by the dispatcher.
    pub pwm_duty_cycle: Option<i64>,
    pub curtain_top_open: Option<bool>,
    pub curtain_side_open: Option<bool>,
}

impl CommandParams {
    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self {
            pwm_duty_cycle: params.get(KEY_PWM).and_then(as_integer),
            curtain_top_open: params.get(KEY_TOP).and_then(as_flag),
            curtain_side_open: params.get(KEY_SIDE).and_then(as_flag),
        }
    }

    /// Requested curtain positions, top first.
    pub fn curtain_requests(&self) -> impl Iterator<Item = (CurtainType, bool)> {
        [
            self.curtain_top_open.map(|open| (CurtainType::Top, open)),
            self.curtain_side_open.map(|open| (CurtainType::Side, open)),
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.pwm_duty_cycle.is_none()
            && self.curtain_top_open.is_none()
            && self.curtain_side_open.is_none()
    }
}

/// Integers, or floats with no fractional part.
fn as_integer(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// JSON booleans, or the 0/1 integers the IoT console sends for bool props.
fn as_flag(v: &Value) -> Option<bool> {
    v.as_bool().or_else(|| match v.as_i64() {
        Some(0) => Some(false),
        Some(1) => Some(true),
        _ => None,
    })
}

/// Manual curtain actions exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainAction {
    Open,
    Close,
    Pause,
    Resume,
    Stop,
}
