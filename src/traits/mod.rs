//! Trait definitions for command station abstraction.
//!
//! This module defines the seam between the layout controller and the
//! outside world, which allows signalbox to:
//! - Drive a real DCC-EX command station over TCP
//! - Run the controller against a recording mock in tests
//!
//! # Submodules
//!
//! - `hardware`: [`CommandStation`] capability set and [`Direction`]

pub mod hardware;

pub use hardware::*;
