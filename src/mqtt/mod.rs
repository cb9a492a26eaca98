//! Minimal MQTT 3.1.1 client for the cloud link.
//!
//! Only the subset the controller needs: CONNECT/CONNACK,
//! PUBLISH/PUBACK, SUBSCRIBE/SUBACK, PINGREQ/PINGRESP, DISCONNECT,
//! QoS 0 and 1.
//!
//! | Module        | Role                                              |
//! |---------------|---------------------------------------------------|
//! | `codec`       | Wire encoding, packet parsing, stream reassembly  |
//! | `credentials` | Signed CONNECT credentials and topic names        |
//! | `payload`     | Telemetry JSON out, command / soil JSON in        |
//! | `transport`   | Byte-stream port the client runs over             |
//! | `client`      | Connection state machine and timers               |

pub mod client;
pub mod codec;
pub mod credentials;
pub mod payload;
pub mod transport;

pub use client::{ClientEvent, ClientSettings, ConnectionState, MqttClient};
pub use transport::Transport;
