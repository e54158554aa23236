//! Command station abstraction and shared hardware enums.
//!
//! The layout controller never talks to a socket directly. It drives a
//! [`CommandStation`], a small capability set built from four primitives
//! (`connect`, `close`, `send`, `send_and_receive`). Every DCC operation the
//! controller needs is a provided method that renders a [`DccCommand`] and
//! hands it to `send`, so a test double only has to implement the
//! primitives to observe exactly what would go over the wire.
//!
//! # Key Items
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`CommandStation`] | Line-oriented command station capability set |
//! | [`Direction`] | Cab direction of travel, with its wire bit |
//!
//! # Implementation
//!
//! For tests use [`crate::hal::MockCommandStation`]. For a real DCC-EX
//! command station use [`crate::dcc::DccClient`].
//!
//! # Example
//!
//! ```rust
//! use signalbox::traits::{CommandStation, Direction};
//! use signalbox::hal::MockCommandStation;
//!
//! let mut station = MockCommandStation::new();
//! station.track_power_main().unwrap();
//! station.set_speed(3, 40, Direction::Forward).unwrap();
//!
//! assert_eq!(station.sent, vec!["<1 MAIN>", "<t 3 40 1>"]);
//! ```

use core::fmt;
use std::time::Duration;

use crate::dcc::protocol::{CabStatus, DccCommand, TurnoutState, MAIN_TRACK, MAX_FUNCTION};

/// Direction of cab travel.
///
/// On the wire forward is `1` and reverse is `0`, both in speed commands
/// and in bit 7 of a cab status speed byte.
///
/// # Default
///
/// Defaults to [`Forward`](Self::Forward), matching a freshly constructed cab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Reverse (wire bit `0`).
    Reverse,
    /// Forward (wire bit `1`).
    #[default]
    Forward,
}

impl Direction {
    /// Returns the direction as a lowercase string.
    ///
    /// ```
    /// use signalbox::Direction;
    ///
    /// assert_eq!(Direction::Forward.as_str(), "forward");
    /// assert_eq!(Direction::Reverse.as_str(), "reverse");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// Wire bit for this direction.
    #[inline]
    pub const fn bit(&self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }

    /// Direction from a wire bit; any non-zero value is forward.
    #[inline]
    pub const fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line-oriented command station capability set.
///
/// Implement the four primitives; every DCC operation is provided on top of
/// them.
///
/// # Contract
///
/// - `connect` is idempotent.
/// - `close` never fails and may be called when already closed.
/// - `send` transmits one line; implementations that own a real connection
///   reconnect and retry once before returning an error.
/// - `send_and_receive` waits at most `timeout` for one response line and
///   reports any failure as `None`.
///
/// # Example Implementation
///
/// ```rust
/// use std::time::Duration;
/// use signalbox::traits::CommandStation;
///
/// struct Printer;
///
/// impl CommandStation for Printer {
///     type Error = std::io::Error;
///
///     fn connect(&mut self) -> Result<(), Self::Error> { Ok(()) }
///     fn close(&mut self) {}
///     fn send(&mut self, line: &str) -> Result<(), Self::Error> {
///         println!("{line}");
///         Ok(())
///     }
///     fn send_and_receive(&mut self, _line: &str, _timeout: Duration) -> Option<String> {
///         None
///     }
/// }
///
/// Printer.emergency_stop().unwrap();
/// ```
pub trait CommandStation {
    /// Error type for send operations.
    type Error: fmt::Display;

    /// Establish the connection. No-op when already connected.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Release the connection.
    fn close(&mut self);

    /// Transmit one command line.
    fn send(&mut self, line: &str) -> Result<(), Self::Error>;

    /// Transmit one line and wait up to `timeout` for a single response line.
    fn send_and_receive(&mut self, line: &str, timeout: Duration) -> Option<String>;

    /// Render and transmit a typed command.
    fn send_command(&mut self, command: &DccCommand) -> Result<(), Self::Error> {
        self.send(&command.to_string())
    }

    /// Power on a named track.
    fn track_power_on(&mut self, track: &str) -> Result<(), Self::Error> {
        tracing::debug!(track, "track power on");
        self.send_command(&DccCommand::power_on(track))
    }

    /// Power off a named track.
    fn track_power_off(&mut self, track: &str) -> Result<(), Self::Error> {
        tracing::debug!(track, "track power off");
        self.send_command(&DccCommand::power_off(track))
    }

    /// Power on the `MAIN` track.
    fn track_power_main(&mut self) -> Result<(), Self::Error> {
        self.track_power_on(MAIN_TRACK)
    }

    /// Halt every locomotive immediately.
    fn emergency_stop(&mut self) -> Result<(), Self::Error> {
        tracing::warn!("emergency stop");
        self.send_command(&DccCommand::EmergencyStop)
    }

    /// Set speed (clamped to 0-127) and direction for a cab.
    fn set_speed(
        &mut self,
        address: u16,
        speed: u8,
        direction: Direction,
    ) -> Result<(), Self::Error> {
        tracing::debug!(address, speed, %direction, "set speed");
        self.send_command(&DccCommand::SetSpeed {
            address,
            speed,
            direction,
        })
    }

    /// Switch a decoder function. Functions above [`MAX_FUNCTION`] are
    /// ignored and nothing is sent.
    fn set_function(&mut self, cab: u16, function: u8, on: bool) -> Result<(), Self::Error> {
        if function > MAX_FUNCTION {
            tracing::warn!(cab, function, "function out of range");
            return Ok(());
        }
        tracing::debug!(cab, function, on, "set function");
        self.send_command(&DccCommand::SetFunction { cab, function, on })
    }

    /// Switch the headlight (F0) on.
    fn light_on(&mut self, cab: u16) -> Result<(), Self::Error> {
        self.set_function(cab, 0, true)
    }

    /// Switch the headlight (F0) off.
    fn light_off(&mut self, cab: u16) -> Result<(), Self::Error> {
        self.set_function(cab, 0, false)
    }

    /// Throw, close or examine a turnout.
    fn set_turnout(&mut self, id: u16, state: TurnoutState) -> Result<(), Self::Error> {
        tracing::debug!(id, state = state.as_wire(), "set turnout");
        self.send_command(&DccCommand::SetTurnout { id, state })
    }

    /// Throw a turnout.
    fn throw_turnout(&mut self, id: u16) -> Result<(), Self::Error> {
        self.set_turnout(id, TurnoutState::Throw)
    }

    /// Close a turnout.
    fn close_turnout(&mut self, id: u16) -> Result<(), Self::Error> {
        self.set_turnout(id, TurnoutState::Close)
    }

    /// Ask the command station to list its turnouts.
    ///
    /// The multi-line answer is not read back.
    fn list_turnouts(&mut self) -> Result<(), Self::Error> {
        self.send_command(&DccCommand::ListTurnouts)
    }

    /// Drive an accessory decoder by address and subaddress.
    fn set_accessory(
        &mut self,
        address: u16,
        subaddress: u8,
        activate: bool,
    ) -> Result<(), Self::Error> {
        tracing::debug!(address, subaddress, activate, "accessory");
        self.send_command(&DccCommand::Accessory {
            address,
            subaddress,
            activate,
        })
    }

    /// Drive an accessory decoder by linear address.
    fn set_accessory_linear(&mut self, address: u16, activate: bool) -> Result<(), Self::Error> {
        tracing::debug!(address, activate, "accessory (linear)");
        self.send_command(&DccCommand::AccessoryLinear { address, activate })
    }

    /// Query a cab's speed, direction and functions.
    ///
    /// Returns `None` when no answer arrives within `timeout` or the answer
    /// is not a `<l ...>` line.
    fn cab_status(&mut self, address: u16, timeout: Duration) -> Option<CabStatus> {
        let query = DccCommand::QueryCab { address }.to_string();
        let status = self
            .send_and_receive(&query, timeout)
            .as_deref()
            .and_then(CabStatus::parse);
        if status.is_none() {
            tracing::warn!(address, "no valid response to cab status request");
        }
        status
    }
}
