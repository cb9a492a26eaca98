//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by rendering every application event as one
//! structured line through the `log` facade (`env_logger` on the host).

use log::{error, info};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => info!("START | controller running"),
            AppEvent::ConnectionStateChanged { from, to } => {
                info!("MQTT | {:?} -> {:?}", from, to);
            }
            AppEvent::CurtainStateChanged { curtain, from, to } => {
                info!("CURTAIN | {} | {} -> {}", curtain, from, to);
            }
            AppEvent::DecisionStateChanged { from, to } => {
                info!("DECISION | {:?} -> {:?}", from, to);
            }
            AppEvent::OperationStarted(op) => info!("DECISION | operation {:?} started", op),
            AppEvent::OperationCompleted(op) => info!("DECISION | operation {:?} completed", op),
            AppEvent::ManualControlLocked(locked) => {
                info!("LOCK | manual control {}", if *locked { "locked" } else { "released" });
            }
            AppEvent::TelemetryPublished(ok) => {
                info!("TELEM | publish {}", if *ok { "ok" } else { "failed" });
            }
            AppEvent::HeartbeatSent => info!("MQTT | heartbeat"),
            AppEvent::CommandReceived {
                command_type,
                message_id,
            } => info!("CMD | {} id={}", command_type, message_id),
            AppEvent::SoilHumidity(value) => info!("SOIL | humidity {:.1}%", value),
            AppEvent::Error(e) => error!("ERROR | {}", e),
        }
    }
}
