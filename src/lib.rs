//! Greenhouse edge controller library.
//!
//! Reports telemetry to the cloud over a minimal MQTT client, takes
//! remote commands, and runs a light-driven automatic policy for the top
//! curtain.  The domain core is single-threaded and poll-driven; all
//! hardware, time and event output goes through the port traits in
//! [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod curtain;
pub mod decision;
pub mod error;
pub mod mqtt;
pub mod pins;
pub mod telemetry;
pub mod timers;
