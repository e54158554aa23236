//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits defined in
//! [`crate::traits`] that are not tied to a network connection.
//!
//! # Available Implementations
//!
//! - `mock`: Recording command station for tests and dry runs
//!
//! The TCP client for a real DCC-EX command station lives in [`crate::dcc`].

pub mod mock;

pub use mock::*;
