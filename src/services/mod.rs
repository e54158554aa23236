//! Services that drive a shared layout controller.
//!
//! - [`SharedLayoutState`]: the one mutex every service locks through
//! - [`ControlLoop`]: periodic speed ramp driver
//! - [`SensorServer`]: TCP line protocol for sensor nodes and operators
//! - `web` feature: Axum-based HTTP API with JSON endpoints
//!
//! # Shared State Pattern
//!
//! All services share a single `LayoutController` via `SharedLayoutState`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use signalbox::services::{ControlLoop, SensorServer, SharedLayoutState};
//!
//! let state = Arc::new(SharedLayoutState::new(controller));
//!
//! let ticker = ControlLoop::default().spawn(Arc::clone(&state));
//! let router = build_router(Arc::clone(&state), &web_config);
//! SensorServer::new(state).run("0.0.0.0:4000").await?;
//! ```

pub mod control_loop;
pub mod sensor_protocol;
pub mod sensor_server;
pub mod shared;

#[cfg(feature = "web")]
pub mod api;

#[cfg(feature = "web")]
pub mod web;

pub use control_loop::*;
pub use sensor_protocol::*;
pub use sensor_server::*;
pub use shared::*;

#[cfg(feature = "web")]
pub use api::*;

#[cfg(feature = "web")]
pub use web::*;
