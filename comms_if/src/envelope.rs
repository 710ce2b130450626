//! # JSON envelope codec
//!
//! Commands on the router text channel are wrapped in an envelope of the form
//!
//! ```json
//! { "to": "rc-car-server", "data": { "action": "turn-to", "degrees": "90.000000" } }
//! ```
//!
//! Numeric fields are always written as decimal text. The decoder accepts either text or JSON
//! numbers for every numeric field.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::cmd::ActuatorCommand;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Source tag of the actuator node on the router.
pub const CAR_PEER_ID: &str = "rc-car-server";

/// Source tag of the operator station on the router.
pub const OPERATOR_PEER_ID: &str = "rc-car-client";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible envelope decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Envelope contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Envelope has no \"data\" object")]
    MissingData,

    #[error("Envelope data has no \"action\" string")]
    MissingAction,

    #[error("Action {0} requires a \"{1}\" field")]
    MissingField(&'static str, &'static str),

    #[error("Field \"{0}\" has an invalid value: {1}")]
    InvalidField(&'static str, String),

    #[error("Could not serialize the envelope: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wrap a command into an envelope addressed to `to`.
pub fn encode_value(cmd: &ActuatorCommand, to: &str) -> Value {
    let mut data = Map::new();
    data.insert("action".into(), Value::String(cmd.action_name().into()));

    match *cmd {
        ActuatorCommand::TurnTo { degrees }
        | ActuatorCommand::ResetTurns { degrees }
        | ActuatorCommand::ChangeDegreeOfTurns { degrees }
        | ActuatorCommand::GimbalTurnTo { degrees }
        | ActuatorCommand::GimbalSetPitch { degrees } => {
            data.insert("degrees".into(), float_text(degrees));
        }
        ActuatorCommand::Move { speed, .. } => {
            data.insert("speed".into(), Value::String(speed.to_string()));
        }
        ActuatorCommand::Init { speed, degrees } => {
            data.insert("speed".into(), Value::String(speed.to_string()));
            data.insert("degrees".into(), float_text(degrees));
        }
        _ => (),
    }

    json!({
        "to": to,
        "data": Value::Object(data)
    })
}

/// Wrap a command into an envelope addressed to `to` and serialize it.
pub fn encode(cmd: &ActuatorCommand, to: &str) -> Result<String, CodecError> {
    serde_json::to_string(&encode_value(cmd, to)).map_err(CodecError::SerializationError)
}

/// Decode an envelope string into a command.
///
/// Unknown actions decode to [`ActuatorCommand::Unknown`], everything malformed is an error.
pub fn decode(json_str: &str) -> Result<ActuatorCommand, CodecError> {
    let val: Value = serde_json::from_str(json_str).map_err(CodecError::InvalidJson)?;

    decode_value(&val)
}

/// Decode an already parsed envelope into a command.
pub fn decode_value(val: &Value) -> Result<ActuatorCommand, CodecError> {
    let data = match val.get("data") {
        Some(d) if d.is_object() => d,
        _ => return Err(CodecError::MissingData),
    };

    let action = match data.get("action").and_then(Value::as_str) {
        Some(a) => a,
        None => return Err(CodecError::MissingAction),
    };

    let id = match ActuatorCommand::id_for_action(action) {
        Some(id) => id,
        None => return Ok(ActuatorCommand::Unknown),
    };

    // Pull the fields each action carries, then reuse the id mapping to build the command
    let mut params = [0f32; 7];
    let name = crate::cmd::ACTION_NAMES[id as usize - 1];

    match id {
        // init
        1 => {
            params[0] = float_field(data, name, "speed")?.trunc();
            params[1] = float_field(data, name, "degrees")?;
        }
        // forward, backward
        5 | 6 => params[0] = float_field(data, name, "speed")?.trunc(),
        // single angle commands
        2 | 3 | 4 | 10 | 11 => params[0] = float_field(data, name, "degrees")?,
        _ => (),
    }

    Ok(ActuatorCommand::from_id_params(id, &params))
}

/// Build a status envelope (`{"to": .., "data": {"status": ..}}`).
pub fn status_message(to: &str, status: &str) -> String {
    json!({
        "to": to,
        "data": { "status": status }
    })
    .to_string()
}

/// Return the `to` field of a parsed envelope, if it is a string.
pub fn recipient(val: &Value) -> Option<&str> {
    val.get("to").and_then(Value::as_str)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Floats go on the wire with six decimals.
fn float_text(value: f32) -> Value {
    Value::String(format!("{:.6}", value))
}

/// Read a numeric field that may be either text or a JSON number.
fn float_field(data: &Value, action: &'static str, key: &'static str) -> Result<f32, CodecError> {
    let value = match data.get(key) {
        Some(Value::String(s)) => s
            .trim()
            .parse::<f32>()
            .map_err(|_| CodecError::InvalidField(key, s.clone()))?,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => f as f32,
            None => return Err(CodecError::InvalidField(key, n.to_string())),
        },
        Some(other) => return Err(CodecError::InvalidField(key, other.to_string())),
        None => return Err(CodecError::MissingField(action, key)),
    };

    if !value.is_finite() {
        return Err(CodecError::InvalidField(key, value.to_string()));
    }

    Ok(value)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::cmd::Direction;

    fn all_commands() -> Vec<ActuatorCommand> {
        vec![
            ActuatorCommand::TurnTo { degrees: 47.25 },
            ActuatorCommand::ResetTurns { degrees: 83.0 },
            ActuatorCommand::ChangeDegreeOfTurns { degrees: 84.0 },
            ActuatorCommand::Move {
                speed: 64,
                direction: Direction::Forward,
            },
            ActuatorCommand::Move {
                speed: 12,
                direction: Direction::Backward,
            },
            ActuatorCommand::SetEscNeutral,
            ActuatorCommand::CameraStart,
            ActuatorCommand::CameraStop,
            ActuatorCommand::GimbalTurnTo { degrees: -33.33 },
            ActuatorCommand::GimbalSetPitch { degrees: 12.0 },
            ActuatorCommand::ResetGimbal,
            ActuatorCommand::SteeringCalibration { on: true },
            ActuatorCommand::SteeringCalibration { on: false },
            ActuatorCommand::Init {
                speed: 50,
                degrees: 83.0,
            },
        ]
    }

    #[test]
    fn test_round_trip_all_commands() {
        for cmd in all_commands() {
            let text = encode(&cmd, CAR_PEER_ID).unwrap();
            let decoded = decode(&text).unwrap();

            assert_eq!(decoded.action_name(), cmd.action_name());

            let (a, b) = (cmd.params(), decoded.params());
            for i in 0..7 {
                assert!((a[i] - b[i]).abs() < 1e-4, "{:?} != {:?}", cmd, decoded);
            }
        }
    }

    #[test]
    fn test_numbers_are_text() {
        let val = encode_value(&ActuatorCommand::TurnTo { degrees: 90.0 }, CAR_PEER_ID);

        assert_eq!(val["to"], "rc-car-server");
        assert_eq!(val["data"]["action"], "turn-to");
        assert_eq!(val["data"]["degrees"], "90.000000");

        let val = encode_value(
            &ActuatorCommand::Move {
                speed: 30,
                direction: Direction::Backward,
            },
            CAR_PEER_ID,
        );
        assert_eq!(val["data"]["action"], "backward");
        assert_eq!(val["data"]["speed"], "30");
    }

    #[test]
    fn test_decode_accepts_json_numbers() {
        let cmd = decode(r#"{"to":"rc-car-server","data":{"action":"forward","speed":40.9}}"#)
            .unwrap();
        assert_eq!(
            cmd,
            ActuatorCommand::Move {
                speed: 40,
                direction: Direction::Forward
            }
        );

        let cmd = decode(r#"{"data":{"action":"turn-to","degrees":" 12.5 "}}"#).unwrap();
        assert_eq!(cmd, ActuatorCommand::TurnTo { degrees: 12.5 });
    }

    #[test]
    fn test_move_direction_follows_action() {
        let cases = [
            ("forward", Direction::Forward),
            ("backward", Direction::Backward),
        ];

        for (action, direction) in cases.iter() {
            let text = format!(r#"{{"data":{{"action":"{}","speed":"25"}}}}"#, action);
            assert_eq!(
                decode(&text).unwrap(),
                ActuatorCommand::Move {
                    speed: 25,
                    direction: *direction
                }
            );
        }
        assert_eq!(
            decode(r#"{"data":{"action":"sideways","speed":"25"}}"#).unwrap(),
            ActuatorCommand::Unknown
        );
    }

    #[test]
    fn test_decode_unknown_action() {
        let cmd = decode(r#"{"to":"rc-car-server","data":{"action":"stop-car"}}"#).unwrap();
        assert_eq!(cmd, ActuatorCommand::Unknown);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("{not json"), Err(CodecError::InvalidJson(_))));
        assert!(matches!(decode(r#"{"to":"x"}"#), Err(CodecError::MissingData)));
        assert!(matches!(
            decode(r#"{"data":{"degrees":"1"}}"#),
            Err(CodecError::MissingAction)
        ));
        assert!(matches!(
            decode(r#"{"data":{"action":"turn-to"}}"#),
            Err(CodecError::MissingField("turn-to", "degrees"))
        ));
        assert!(matches!(
            decode(r#"{"data":{"action":"turn-to","degrees":"left"}}"#),
            Err(CodecError::InvalidField("degrees", _))
        ));
        assert!(matches!(
            decode(r#"{"data":{"action":"turn-to","degrees":"NaN"}}"#),
            Err(CodecError::InvalidField("degrees", _))
        ));
    }

    #[test]
    fn test_status_message() {
        let val: Value = serde_json::from_str(&status_message(OPERATOR_PEER_ID, "started")).unwrap();
        assert_eq!(recipient(&val), Some("rc-car-client"));
        assert_eq!(val["data"]["status"], "started");
    }
}
