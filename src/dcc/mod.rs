//! DCC-EX command station support.
//!
//! - [`protocol`]: the text wire grammar, rendered from typed commands
//! - [`client`]: the TCP transport implementing [`CommandStation`]
//!
//! [`CommandStation`]: crate::traits::CommandStation

pub mod client;
pub mod protocol;

pub use client::{DccClient, DccError, DEFAULT_CONNECT_TIMEOUT};
pub use protocol::{CabStatus, DccCommand, TurnoutState, MAIN_TRACK, MAX_FUNCTION, MAX_SPEED};
