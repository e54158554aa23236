//! DCC-EX wire grammar.
//!
//! Every command sent to the command station is a single text line of the
//! form `<OPCODE ARGS...>`. [`DccCommand`] renders each supported command via
//! [`Display`](core::fmt::Display), and [`CabStatus::parse`] decodes the
//! `<l ...>` broadcast a command station sends in answer to a cab query.
//!
//! | Command | Line |
//! |---------|------|
//! | Track power on/off | `<1 MAIN>` / `<0 MAIN>` |
//! | Set speed | `<t ADDR SPEED DIR>` |
//! | Query cab | `<t ADDR>` |
//! | Emergency stop | `<!>` |
//! | Decoder function | `<F CAB FUNCT STATE>` |
//! | Turnout | `<T ID STATE>` / `<T>` |
//! | Accessory | `<a ADDR SUBADDR ACTIVATE>` / `<a ADDR ACTIVATE>` |
//!
//! # Example
//!
//! ```rust
//! use signalbox::dcc::{CabStatus, DccCommand};
//! use signalbox::Direction;
//!
//! let cmd = DccCommand::SetSpeed { address: 3, speed: 42, direction: Direction::Forward };
//! assert_eq!(cmd.to_string(), "<t 3 42 1>");
//!
//! let status = CabStatus::parse("<l 3 0 170 5>").unwrap();
//! assert_eq!(status.speed, 42);
//! assert_eq!(status.direction, Direction::Forward);
//! ```

use core::fmt;

use crate::traits::Direction;

/// Track name used when none is given.
pub const MAIN_TRACK: &str = "MAIN";

/// Highest speed step a DCC decoder accepts (128-step mode).
pub const MAX_SPEED: u8 = 127;

/// Highest decoder function number (F0-F68).
pub const MAX_FUNCTION: u8 = 68;

/// Turnout (point) command state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnoutState {
    /// Throw the turnout (`1`).
    Throw,
    /// Close the turnout (`0`).
    Close,
    /// Ask the command station to examine the turnout (`X`).
    Examine,
}

impl TurnoutState {
    /// Wire token for this state.
    pub const fn as_wire(&self) -> &'static str {
        match self {
            TurnoutState::Throw => "1",
            TurnoutState::Close => "0",
            TurnoutState::Examine => "X",
        }
    }

    /// Parse the wire forms `1`/`T`, `0`/`C` and `X`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1" | "T" => Some(TurnoutState::Throw),
            "0" | "C" => Some(TurnoutState::Close),
            "X" => Some(TurnoutState::Examine),
            _ => None,
        }
    }
}

/// A single command in the DCC-EX text protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DccCommand {
    /// Switch power for a named track (`MAIN`, `PROG`, ...).
    TrackPower {
        /// `true` for power on.
        on: bool,
        /// Track name.
        track: String,
    },
    /// Set speed and direction of one cab. Speed is clamped to 0-127 on render.
    SetSpeed {
        /// Cab address.
        address: u16,
        /// Speed step.
        speed: u8,
        /// Direction of travel.
        direction: Direction,
    },
    /// Ask for the state of one cab; answered with an `<l ...>` line.
    QueryCab {
        /// Cab address.
        address: u16,
    },
    /// Stop every cab on the layout.
    EmergencyStop,
    /// Switch a decoder function (lights, sound, ...).
    SetFunction {
        /// Cab address.
        cab: u16,
        /// Function number, 0-68.
        function: u8,
        /// `true` for on.
        on: bool,
    },
    /// Throw, close or examine a turnout.
    SetTurnout {
        /// Turnout id.
        id: u16,
        /// Requested state.
        state: TurnoutState,
    },
    /// List defined turnouts.
    ListTurnouts,
    /// Accessory decoder, address/subaddress form (addr 0-511, subaddr 0-3).
    Accessory {
        /// Decoder address.
        address: u16,
        /// Output on the decoder.
        subaddress: u8,
        /// Activate or deactivate.
        activate: bool,
    },
    /// Accessory decoder, linear address form (1-2044).
    AccessoryLinear {
        /// Linear address.
        address: u16,
        /// Activate or deactivate.
        activate: bool,
    },
}

impl DccCommand {
    /// Power on the named track.
    pub fn power_on(track: &str) -> Self {
        DccCommand::TrackPower {
            on: true,
            track: track.to_string(),
        }
    }

    /// Power off the named track.
    pub fn power_off(track: &str) -> Self {
        DccCommand::TrackPower {
            on: false,
            track: track.to_string(),
        }
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

impl fmt::Display for DccCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DccCommand::TrackPower { on, track } => write!(f, "<{} {}>", flag(*on), track),
            DccCommand::SetSpeed {
                address,
                speed,
                direction,
            } => write!(
                f,
                "<t {} {} {}>",
                address,
                (*speed).min(MAX_SPEED),
                direction.bit()
            ),
            DccCommand::QueryCab { address } => write!(f, "<t {}>", address),
            DccCommand::EmergencyStop => write!(f, "<!>"),
            DccCommand::SetFunction { cab, function, on } => {
                write!(f, "<F {} {} {}>", cab, function, flag(*on))
            }
            DccCommand::SetTurnout { id, state } => write!(f, "<T {} {}>", id, state.as_wire()),
            DccCommand::ListTurnouts => write!(f, "<T>"),
            DccCommand::Accessory {
                address,
                subaddress,
                activate,
            } => write!(f, "<a {} {} {}>", address, subaddress, flag(*activate)),
            DccCommand::AccessoryLinear { address, activate } => {
                write!(f, "<a {} {}>", address, flag(*activate))
            }
        }
    }
}

/// Decoded `<l CAB REG SPEEDBYTE FUNCMAP>` broadcast.
///
/// The speed byte packs speed (bits 0-6) and direction (bit 7, set = forward).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CabStatus {
    /// Cab address echoed by the command station.
    pub cab: u32,
    /// Register slot holding the cab.
    pub register: u32,
    /// Speed step, 0-127.
    pub speed: u8,
    /// Direction of travel.
    pub direction: Direction,
    /// Raw speed byte as received.
    pub speed_byte: u32,
    /// Function state bitmap.
    pub function_map: u32,
}

impl CabStatus {
    /// Find and decode the first `<l ...>` group in `line`.
    ///
    /// Returns `None` when the line holds no well-formed group.
    ///
    /// ```rust
    /// use signalbox::dcc::CabStatus;
    /// use signalbox::Direction;
    ///
    /// let status = CabStatus::parse("<l 3 0 97 5>").unwrap();
    /// assert_eq!((status.cab, status.register, status.speed), (3, 0, 97));
    /// assert_eq!(status.direction, Direction::Reverse);
    /// assert_eq!(status.function_map, 5);
    ///
    /// assert!(CabStatus::parse("<p1>").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line;
        while let Some(start) = rest.find("<l") {
            let candidate = &rest[start + 2..];
            if let Some(status) = Self::parse_fields(candidate) {
                return Some(status);
            }
            rest = candidate;
        }
        None
    }

    /// Decode the text following `<l`, up to the closing `>`.
    fn parse_fields(after_opcode: &str) -> Option<Self> {
        if !after_opcode.starts_with(char::is_whitespace) {
            return None;
        }
        let end = after_opcode.find('>')?;
        let body = &after_opcode[..end];
        // no whitespace allowed before the closing bracket
        if body.ends_with(char::is_whitespace) {
            return None;
        }

        let mut fields = [0u32; 4];
        let mut count = 0;
        for token in body.split_whitespace() {
            if count == fields.len() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            fields[count] = token.parse().ok()?;
            count += 1;
        }
        if count != fields.len() {
            return None;
        }

        let [cab, register, speed_byte, function_map] = fields;
        Some(Self {
            cab,
            register,
            speed: (speed_byte & 0x7F) as u8,
            direction: Direction::from_bit(((speed_byte & 0x80) >> 7) as u8),
            speed_byte,
            function_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_track_power() {
        assert_eq!(DccCommand::power_on(MAIN_TRACK).to_string(), "<1 MAIN>");
        assert_eq!(DccCommand::power_off("PROG").to_string(), "<0 PROG>");
    }

    #[test]
    fn renders_speed_with_direction_bit() {
        let fwd = DccCommand::SetSpeed {
            address: 2,
            speed: 30,
            direction: Direction::Forward,
        };
        let rev = DccCommand::SetSpeed {
            address: 2,
            speed: 20,
            direction: Direction::Reverse,
        };
        assert_eq!(fwd.to_string(), "<t 2 30 1>");
        assert_eq!(rev.to_string(), "<t 2 20 0>");
    }

    #[test]
    fn speed_clamped_on_render() {
        let cmd = DccCommand::SetSpeed {
            address: 7,
            speed: 200,
            direction: Direction::Forward,
        };
        assert_eq!(cmd.to_string(), "<t 7 127 1>");
    }

    #[test]
    fn renders_remaining_commands() {
        assert_eq!(DccCommand::QueryCab { address: 3 }.to_string(), "<t 3>");
        assert_eq!(DccCommand::EmergencyStop.to_string(), "<!>");
        assert_eq!(
            DccCommand::SetFunction {
                cab: 2,
                function: 0,
                on: true
            }
            .to_string(),
            "<F 2 0 1>"
        );
        assert_eq!(
            DccCommand::SetTurnout {
                id: 1,
                state: TurnoutState::Examine
            }
            .to_string(),
            "<T 1 X>"
        );
        assert_eq!(DccCommand::ListTurnouts.to_string(), "<T>");
        assert_eq!(
            DccCommand::Accessory {
                address: 10,
                subaddress: 0,
                activate: true
            }
            .to_string(),
            "<a 10 0 1>"
        );
        assert_eq!(
            DccCommand::AccessoryLinear {
                address: 100,
                activate: false
            }
            .to_string(),
            "<a 100 0>"
        );
    }

    #[test]
    fn turnout_state_wire_forms() {
        assert_eq!(TurnoutState::from_wire("T"), Some(TurnoutState::Throw));
        assert_eq!(TurnoutState::from_wire("1"), Some(TurnoutState::Throw));
        assert_eq!(TurnoutState::from_wire("c"), Some(TurnoutState::Close));
        assert_eq!(TurnoutState::from_wire("0"), Some(TurnoutState::Close));
        assert_eq!(TurnoutState::from_wire("X"), Some(TurnoutState::Examine));
        assert_eq!(TurnoutState::from_wire("?"), None);
    }

    #[test]
    fn parses_reverse_status() {
        let status = CabStatus::parse("<l 3 0 97 5>").unwrap();
        assert_eq!(status.cab, 3);
        assert_eq!(status.register, 0);
        assert_eq!(status.speed, 97);
        assert_eq!(status.direction, Direction::Reverse);
        assert_eq!(status.speed_byte, 97);
        assert_eq!(status.function_map, 5);
    }

    #[test]
    fn parses_forward_status() {
        // 128 + 42
        let status = CabStatus::parse("<l 2 1 170 0>").unwrap();
        assert_eq!(status.speed, 42);
        assert_eq!(status.direction, Direction::Forward);
        assert_eq!(status.speed_byte, 170);
    }

    #[test]
    fn finds_status_inside_noise() {
        let status = CabStatus::parse("<p1 MAIN><l  4   2 129 7>").unwrap();
        assert_eq!(status.cab, 4);
        assert_eq!(status.speed, 1);
        assert_eq!(status.direction, Direction::Forward);
    }

    #[test]
    fn rejects_malformed_status() {
        assert!(CabStatus::parse("").is_none());
        assert!(CabStatus::parse("<l 3 0 97>").is_none());
        assert!(CabStatus::parse("<l 3 0 97 5 1>").is_none());
        assert!(CabStatus::parse("<l 3 0 -97 5>").is_none());
        assert!(CabStatus::parse("<l3 0 97 5>").is_none());
        assert!(CabStatus::parse("<l 3 0 97 5").is_none());
        assert!(CabStatus::parse("<l 3 0 97 5 >").is_none());
        assert!(CabStatus::parse("<t 3 0 97 5>").is_none());
    }
}
