//! # signalbox
//!
//! A supervisor for a DCC model railway. It drives locomotives ("cabs")
//! through a DCC-EX command station, tracks which sector each cab occupies
//! from proximity sensor events, and ramps cab speeds smoothly toward
//! targets set by operators and sector speed limits.
//!
//! ## Features
//!
//! - **Command station client**: DCC-EX over TCP with reconnect and timed status queries
//! - **Sector state machine**: Triggers must follow the sector cycle, misfires are rejected
//! - **Speed ramping**: A periodic tick moves each cab toward its target at its own acceleration
//! - **Sensor server**: Many concurrent sensor nodes feeding one lock-protected controller
//! - **HTTP API** (`web` feature): Status and operator commands as JSON
//!
//! ## Architecture
//!
//! - `traits` - Command station capability trait and shared enums
//! - `dcc` - DCC-EX wire grammar and TCP client
//! - `layout` - Passive model of cabs, sectors and sensors
//! - `controller` - State machine, speed ramp and status snapshots
//! - `services` - Shared state, control loop, sensor server, HTTP API
//! - `loader` / `config_store` / `config` - Files read at startup
//! - `hal` - Mock command station for testing
//!
//! ## Example
//!
//! ```rust
//! use signalbox::{
//!     LayoutController,
//!     hal::MockCommandStation,
//!     loader::LayoutLoader,
//! };
//!
//! let layout = LayoutLoader::from_yaml(r#"
//! name: demo
//! cabs: [{ name: Santa Fe 3751, address: 2 }]
//! sectors: [{ id: 1 }, { id: 2, speed_limit: 30 }]
//! proximity_sensors: [{ id: a, sector_id: 1 }, { id: b, sector_id: 2 }]
//! "#).unwrap();
//!
//! let mut controller = LayoutController::new(layout, MockCommandStation::new());
//! controller.start().unwrap();
//!
//! controller.sensor_triggered("a", None); // initial placement
//! controller.sensor_triggered("b", None); // enters sector 2, target 30
//!
//! // Call from a periodic driver
//! controller.tick(0.1);
//! ```

#![warn(missing_docs)]

/// Application configuration with defaults and builders.
pub mod config;
/// Per-sensor settings persisted to YAML.
pub mod config_store;
/// Layout controller: sector state machine and speed ramp.
pub mod controller;
/// DCC-EX protocol and TCP client.
pub mod dcc;
/// Mock implementations for testing.
pub mod hal;
/// Passive layout model.
pub mod layout;
/// YAML layout definitions and entity builders.
pub mod loader;
/// Shared state, control loop, sensor server and optional HTTP API.
pub mod services;
/// Command station trait and shared enums.
pub mod traits;

// Re-exports for convenience
pub use config::{Config, ControlLoopConfig, DccConfig, SensorServerConfig, WebConfig};
pub use controller::{LayoutController, LayoutStatus, RejectReason, TransitionOutcome};
pub use dcc::{CabStatus, DccClient, DccCommand, DccError};
pub use layout::{Cab, Layout, LayoutSector, ProximitySensor, SectorId};
pub use loader::{LayoutLoader, LoadError};
pub use traits::{CommandStation, Direction};
