//! Application core: domain orchestration, no direct I/O.
//!
//! Hardware, clock and event output are reached through the **port
//! traits** in [`ports`]; [`service::AppService`] wires the domain
//! components together and dispatches cloud commands.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
