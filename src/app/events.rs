//! Outbound application events.
//!
//! Every component emits these through the
//! [`EventSink`](super::ports::EventSink) port.  State changes carry the
//! exact `(from, to)` pair and are delivered synchronously, before the
//! call that caused them returns.

use crate::curtain::{CurtainState, CurtainType};
use crate::decision::{DecisionState, OperationType};
use crate::error::Error;
use crate::mqtt::client::ConnectionState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The application service has started.
    Started,

    /// The broker connection moved between states.
    ConnectionStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// A curtain moved between states.  `from == to` is an advisory
    /// re-emit (see [`CurtainController::stop`](crate::curtain::CurtainController::stop)).
    CurtainStateChanged {
        curtain: CurtainType,
        from: CurtainState,
        to: CurtainState,
    },

    /// The light-decision policy moved between states.
    DecisionStateChanged { from: DecisionState, to: DecisionState },

    /// An automatic curtain operation began.
    OperationStarted(OperationType),

    /// An automatic curtain operation finished (or was aborted).
    OperationCompleted(OperationType),

    /// Manual top-curtain control was locked (`true`) or released.
    ManualControlLocked(bool),

    /// Result of one telemetry publish.
    TelemetryPublished(bool),

    /// A PINGREQ went out.
    HeartbeatSent,

    /// A control command arrived and was handed to the dispatcher.
    CommandReceived {
        command_type: String,
        message_id: String,
    },

    /// A soil-humidity push arrived from the cloud.
    SoilHumidity(f64),

    /// A component detected and recovered from a failure.
    Error(Error),
}
