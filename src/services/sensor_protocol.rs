//! Line protocol spoken by sensor nodes and operator tools.
//!
//! One command per line, space separated:
//!
//! | Line | Reply |
//! |------|-------|
//! | `HELLO node_id firmware` | none |
//! | `READING sensor_id avg=N [k=v ...]` | none |
//! | `MANUAL_SECTOR_ADVANCE` | `OK` |
//! | `STATUS` | status JSON on one line |
//! | `SET_TARGET_SPEED address speed` | `OK` or `ERROR` |
//!
//! # Example
//!
//! ```rust
//! use signalbox::services::SensorCommand;
//!
//! let cmd = SensorCommand::parse("READING end_of_hill avg=1320 min=1200").unwrap();
//! assert_eq!(cmd.reading_avg(), Some(1320));
//! ```

use thiserror::Error;

/// A parsed protocol line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorCommand {
    /// Node identification, logged only.
    Hello {
        /// Node id, `unknown` if absent.
        node_id: String,
        /// Firmware version, `?` if absent.
        firmware: String,
    },

    /// A detector reading.
    Reading {
        /// Proximity sensor id.
        sensor_id: String,
        /// The `avg` field, if present and numeric.
        avg: Option<i64>,
        /// Every `key=value` field in order, `avg` included.
        fields: Vec<(String, String)>,
    },

    /// Force the primary cab into the next sector.
    ManualSectorAdvance,

    /// Request a status snapshot.
    Status,

    /// Set a cab's target speed.
    SetTargetSpeed {
        /// Cab address.
        address: u16,
        /// Requested speed, clamped by the controller.
        speed: i64,
    },

    /// Any other first token; the whole line is kept for logging.
    Unknown(String),
}

/// Why a line could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The line had no tokens.
    #[error("empty line")]
    Empty,

    /// A required argument was not given.
    #[error("{command}: missing {argument}")]
    MissingArgument {
        /// Command keyword.
        command: &'static str,
        /// Argument name.
        argument: &'static str,
    },

    /// An argument was not a valid number.
    #[error("{command}: invalid {argument} {value:?}")]
    InvalidArgument {
        /// Command keyword.
        command: &'static str,
        /// Argument name.
        argument: &'static str,
        /// Token as received.
        value: String,
    },
}

impl ProtocolError {
    /// Command keyword the error relates to, if any.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            ProtocolError::Empty => None,
            ProtocolError::MissingArgument { command, .. }
            | ProtocolError::InvalidArgument { command, .. } => Some(*command),
        }
    }
}

const SET_TARGET_SPEED: &str = "SET_TARGET_SPEED";

impl SensorCommand {
    /// Parse one line. Leading and trailing whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().ok_or(ProtocolError::Empty)?;

        match keyword {
            "HELLO" => Ok(SensorCommand::Hello {
                node_id: tokens.next().unwrap_or("unknown").to_string(),
                firmware: tokens.next().unwrap_or("?").to_string(),
            }),
            "READING" => {
                let sensor_id = tokens.next().ok_or(ProtocolError::MissingArgument {
                    command: "READING",
                    argument: "sensor_id",
                })?;
                let fields: Vec<(String, String)> = tokens
                    .filter_map(|t| t.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let avg = fields
                    .iter()
                    .find(|(k, _)| k == "avg")
                    .and_then(|(_, v)| v.parse().ok());
                Ok(SensorCommand::Reading {
                    sensor_id: sensor_id.to_string(),
                    avg,
                    fields,
                })
            }
            "MANUAL_SECTOR_ADVANCE" => Ok(SensorCommand::ManualSectorAdvance),
            "STATUS" => Ok(SensorCommand::Status),
            SET_TARGET_SPEED => {
                let address = number_arg(tokens.next(), "address")?;
                let speed = number_arg(tokens.next(), "speed")?;
                Ok(SensorCommand::SetTargetSpeed { address, speed })
            }
            _ => Ok(SensorCommand::Unknown(line.trim().to_string())),
        }
    }

    /// The `avg` of a `READING`, if any.
    pub fn reading_avg(&self) -> Option<i64> {
        match self {
            SensorCommand::Reading { avg, .. } => *avg,
            _ => None,
        }
    }
}

fn number_arg<T: std::str::FromStr>(
    token: Option<&str>,
    argument: &'static str,
) -> Result<T, ProtocolError> {
    let token = token.ok_or(ProtocolError::MissingArgument {
        command: SET_TARGET_SPEED,
        argument,
    })?;
    token.parse().map_err(|_| ProtocolError::InvalidArgument {
        command: SET_TARGET_SPEED,
        argument,
        value: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_with_defaults() {
        assert_eq!(
            SensorCommand::parse("HELLO esp-7 1.2.0").unwrap(),
            SensorCommand::Hello {
                node_id: "esp-7".into(),
                firmware: "1.2.0".into()
            }
        );
        assert_eq!(
            SensorCommand::parse("HELLO").unwrap(),
            SensorCommand::Hello {
                node_id: "unknown".into(),
                firmware: "?".into()
            }
        );
    }

    #[test]
    fn reading_fields() {
        let cmd = SensorCommand::parse("  READING crest avg=1499 min=1200 junk  ").unwrap();
        assert_eq!(
            cmd,
            SensorCommand::Reading {
                sensor_id: "crest".into(),
                avg: Some(1499),
                fields: vec![
                    ("avg".into(), "1499".into()),
                    ("min".into(), "1200".into())
                ],
            }
        );
    }

    #[test]
    fn reading_without_numeric_avg() {
        assert_eq!(SensorCommand::parse("READING s1 max=3").unwrap().reading_avg(), None);
        assert_eq!(SensorCommand::parse("READING s1 avg=high").unwrap().reading_avg(), None);
        assert_eq!(
            SensorCommand::parse("READING").unwrap_err(),
            ProtocolError::MissingArgument {
                command: "READING",
                argument: "sensor_id"
            }
        );
    }

    #[test]
    fn keywords_without_arguments() {
        assert_eq!(
            SensorCommand::parse("MANUAL_SECTOR_ADVANCE").unwrap(),
            SensorCommand::ManualSectorAdvance
        );
        assert_eq!(SensorCommand::parse("STATUS").unwrap(), SensorCommand::Status);
    }

    #[test]
    fn set_target_speed_arguments() {
        assert_eq!(
            SensorCommand::parse("SET_TARGET_SPEED 3 -20").unwrap(),
            SensorCommand::SetTargetSpeed {
                address: 3,
                speed: -20
            }
        );

        let err = SensorCommand::parse("SET_TARGET_SPEED 3").unwrap_err();
        assert_eq!(err.command(), Some("SET_TARGET_SPEED"));

        let err = SensorCommand::parse("SET_TARGET_SPEED three 10").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidArgument { argument: "address", .. }
        ));
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(
            SensorCommand::parse("status please").unwrap(),
            SensorCommand::Unknown("status please".into())
        );
        assert_eq!(SensorCommand::parse("   ").unwrap_err(), ProtocolError::Empty);
        assert_eq!(ProtocolError::Empty.command(), None);
    }
}
