//! Unified error types for the greenhouse edge controller.
//!
//! A single `Error` enum that every subsystem converts into, so the event
//! loop and the event sink see one uniform type.  The variants mirror the
//! five failure classes the controller distinguishes:
//!
//! | Class            | Raised by                     | Recovery                       |
//! |------------------|-------------------------------|--------------------------------|
//! | `Transport`      | socket I/O                    | Disconnected + reconnect       |
//! | `Protocol`       | MQTT framing / CONNACK        | packet dropped or conn. closed |
//! | `Actuation`      | GPIO / PWM writes             | curtain → Error state          |
//! | `Rejected`       | state-machine preconditions   | caller retries later           |
//! | `DataUnavailable`| sensor feeds                  | telemetry substitutes default  |
//!
//! All variants are `Copy` so they can ride inside [`AppEvent`](crate::app::events::AppEvent)
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Socket-level failure on the broker connection.
    Transport(TransportError),
    /// Malformed packet or unexpected broker response.
    Protocol(ProtocolError),
    /// A GPIO or PWM write failed.
    Actuation(ActuationError),
    /// A state-machine precondition was violated.
    Rejected(PolicyRejection),
    /// A sensor could not be read or returned out-of-range data.
    DataUnavailable(SensorError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Actuation(e) => write!(f, "actuation: {e}"),
            Self::Rejected(e) => write!(f, "rejected: {e}"),
            Self::DataUnavailable(e) => write!(f, "data unavailable: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Host resolution or TCP connect failed.
    ConnectFailed,
    /// Peer closed the connection (EOF).
    Closed,
    /// Operation requires an open connection but none is present.
    NotConnected,
    /// Generic socket I/O failure.
    Io,
    /// Outbound buffer would exceed its limit.
    BufferFull,
    /// TLS setup, handshake or record failure.
    Tls,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Io => write!(f, "socket I/O error"),
            Self::BufferFull => write!(f, "outbound buffer full"),
            Self::Tls => write!(f, "TLS failure"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Remaining-length field ran past four bytes.
    MalformedLength,
    /// Value too large for the remaining-length encoding.
    PacketTooLarge,
    /// String longer than a 16-bit length prefix allows.
    StringTooLong,
    /// Length-prefixed string was truncated or not UTF-8.
    InvalidString,
    /// Packet body shorter than its type requires.
    ShortPacket(u8),
    /// Reassembly buffer overflowed before a packet completed.
    BufferOverflow,
    /// Broker refused the connection with this CONNACK return code.
    ConnectionRefused(u8),
    /// Payload could not be interpreted.
    InvalidPayload,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLength => write!(f, "malformed remaining length"),
            Self::PacketTooLarge => write!(f, "packet too large"),
            Self::StringTooLong => write!(f, "string exceeds 65535 bytes"),
            Self::InvalidString => write!(f, "invalid length-prefixed string"),
            Self::ShortPacket(kind) => write!(f, "short packet (type 0x{kind:02X})"),
            Self::BufferOverflow => write!(f, "receive buffer overflow"),
            Self::ConnectionRefused(code) => write!(f, "connection refused, return code {code}"),
            Self::InvalidPayload => write!(f, "invalid payload"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Actuation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationError {
    /// Writing to the export file failed.
    ExportFailed { pin: u32 },
    /// Setting the pin direction failed.
    DirectionFailed { pin: u32 },
    /// Setting the pin level failed.
    WriteFailed { pin: u32 },
    /// Reading the pin level failed.
    ReadFailed { pin: u32 },
    /// A PWM attribute write failed.
    PwmWriteFailed,
    /// The PWM channel has not been initialised.
    PwmUnavailable,
}

impl fmt::Display for ActuationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExportFailed { pin } => write!(f, "GPIO{pin} export failed"),
            Self::DirectionFailed { pin } => write!(f, "GPIO{pin} direction write failed"),
            Self::WriteFailed { pin } => write!(f, "GPIO{pin} write failed"),
            Self::ReadFailed { pin } => write!(f, "GPIO{pin} read failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::PwmUnavailable => write!(f, "PWM channel unavailable"),
        }
    }
}

impl From<ActuationError> for Error {
    fn from(e: ActuationError) -> Self {
        Self::Actuation(e)
    }
}

// ---------------------------------------------------------------------------
// Policy rejections
// ---------------------------------------------------------------------------

/// A precondition violation.  Never fatal; the caller may retry once the
/// component is in the right state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRejection {
    /// Curtain command issued before `initialize()` succeeded.
    Uninitialized,
    /// The decision manager is executing an operation.
    OperationInProgress,
    /// Manual curtain control is locked by the decision manager.
    ManualControlLocked,
    /// Publish attempted while the broker connection is down.
    NotConnected,
    /// Payload was empty or the snapshot was not valid.
    InvalidPayload,
    /// `resume()` called on a curtain that is not paused.
    NotPaused,
    /// Duty cycle outside 0..=100.
    DutyOutOfRange,
    /// Open threshold must be above the close threshold.
    InvalidThresholds,
}

impl fmt::Display for PolicyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "controller not initialised"),
            Self::OperationInProgress => write!(f, "automatic operation in progress"),
            Self::ManualControlLocked => write!(f, "manual control locked"),
            Self::NotConnected => write!(f, "broker not connected"),
            Self::InvalidPayload => write!(f, "empty or invalid payload"),
            Self::NotPaused => write!(f, "curtain is not paused"),
            Self::DutyOutOfRange => write!(f, "duty cycle out of range"),
            Self::InvalidThresholds => write!(f, "open threshold must exceed close threshold"),
        }
    }
}

impl From<PolicyRejection> for Error {
    fn from(e: PolicyRejection) -> Self {
        Self::Rejected(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No reading has been produced yet, or the device is absent.
    Unavailable,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "sensor unavailable"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::DataUnavailable(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
