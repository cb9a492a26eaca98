//! JSON payloads carried over MQTT.
//!
//! Outbound: the thing-model property post built from a
//! [`DeviceData`] snapshot.
//!
//! Inbound: messages on the command topic are classified in a fixed
//! precedence order; the first match wins:
//!
//! 1. `{"items": {"soilHumidity": {"value": N}}}`
//! 2. `{"params": {"soilHumidity": N}}`
//! 3. `{"soilHumidity": N}`
//! 4. `{"method": "...", "params": {...}}` → generic control command

use serde::Serialize;
use serde_json::Value;

use crate::app::commands::ControlCommand;
use crate::error::ProtocolError;
use crate::telemetry::DeviceData;

pub const POST_VERSION: &str = "1.0";
pub const POST_METHOD: &str = "thing.event.property.post";

// ── Outbound ──────────────────────────────────────────────────

#[derive(Serialize)]
struct PropertyPost<'a> {
    id: String,
    version: &'a str,
    method: &'a str,
    params: PostParams,
}

#[derive(Serialize)]
struct PostParams {
    temperature: f64,
    #[serde(rename = "Humidity")]
    humidity: f64,
    #[serde(rename = "LightLux")]
    light_lux: i64,
    pwm: u8,
}

/// Serialise `data` as a property post with message id `id_ms`.
pub fn property_post(data: &DeviceData, id_ms: u64) -> Result<Vec<u8>, ProtocolError> {
    let post = PropertyPost {
        id: id_ms.to_string(),
        version: POST_VERSION,
        method: POST_METHOD,
        params: PostParams {
            temperature: data.temperature,
            humidity: data.humidity,
            light_lux: data.light_intensity.trunc() as i64,
            pwm: data.pwm_duty_cycle,
        },
    };
    serde_json::to_vec(&post).map_err(|_| ProtocolError::InvalidPayload)
}

// ── Inbound ───────────────────────────────────────────────────

/// What an inbound PUBLISH turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Soil-humidity push; bypasses the command dispatcher.
    SoilHumidity(f64),
    Command(ControlCommand),
    /// Valid JSON object with none of the recognised shapes.
    Unrecognized,
}

/// Classify an inbound payload.
///
/// Anything before the first `{` is skipped, so a stray prefix in front of
/// the JSON document does not defeat parsing.
pub fn classify(payload: &[u8], received_at_ms: u64) -> Result<InboundMessage, ProtocolError> {
    let start = payload
        .iter()
        .position(|&b| b == b'{')
        .ok_or(ProtocolError::InvalidPayload)?;
    let doc: Value =
        serde_json::from_slice(&payload[start..]).map_err(|_| ProtocolError::InvalidPayload)?;
    let Some(obj) = doc.as_object() else {
        return Err(ProtocolError::InvalidPayload);
    };

    // A soil-humidity field claims the message even when its value is
    // unusable; such a message is dropped, never dispatched.
    let soil = obj
        .get("items")
        .and_then(|items| items.get("soilHumidity"))
        .and_then(|item| item.get("value"))
        .or_else(|| obj.get("params").and_then(|params| params.get("soilHumidity")))
        .or_else(|| obj.get("soilHumidity"));
    if let Some(raw) = soil {
        return Ok(match soil_value(raw) {
            Some(value) => InboundMessage::SoilHumidity(value),
            None => InboundMessage::Unrecognized,
        });
    }

    if let (Some(method), Some(params)) = (obj.get("method"), obj.get("params")) {
        let message_id = match obj.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        return Ok(InboundMessage::Command(ControlCommand {
            command_type: method.as_str().unwrap_or_default().to_owned(),
            parameters: params.as_object().cloned().unwrap_or_default(),
            message_id,
            received_at_ms,
        }));
    }

    Ok(InboundMessage::Unrecognized)
}

/// Numbers as-is; numeric strings are parsed.
fn soil_value(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
