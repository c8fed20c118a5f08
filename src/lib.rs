//! # Voltaic - PV surplus charging regulator for a home wallbox
//!
//! Voltaic regulates the maximum charge current of a wallbox so the vehicle
//! charges from on-site PV whenever possible, while respecting the home
//! battery's priority and the vehicle's connection state. It runs unattended
//! as a long-lived process next to an MQTT broker and Home Assistant.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `telemetry`: Rolling windows and latest-value registers
//! - `mode`: Operating modes and selector label resolution
//! - `connection`: Wallbox connection codes and the connection gate
//! - `controls`: Set-point domain, fixed modes and PV-adaptive regulation
//! - `actuator`: Set-point commands with bounded confirmation waits
//! - `selector`: Home Assistant mode selector
//! - `mqtt`: MQTT transport for telemetry and commands
//! - `regulator`: The regulation tick and run loop
//! - `lifecycle`: Shutdown signals and the guaranteed 0 A release
//! - `web`: Read-only status API (feature `web`)

pub mod actuator;
pub mod config;
pub mod connection;
pub mod controls;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod mode;
pub mod mqtt;
pub mod regulator;
pub mod selector;
pub mod telemetry;
#[cfg(feature = "web")]
pub mod web;

#[cfg(test)]
mod config_tests;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, VoltaicError};
pub use regulator::{Regulator, StatusSnapshot};
