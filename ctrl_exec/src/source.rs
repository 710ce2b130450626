//! # Input sources
//!
//! Anything that can produce controller events implements [`InputSource`]. The operator station
//! ships with [`ScriptSource`], which replays a timestamped input script.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::Path;
use std::time::Instant;

use comms_if::input::InputEvent;
use util::script_interpreter::{Pending, ScriptError, ScriptInterpreter};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait InputSource {
    /// Return the events that happened since the last poll.
    fn poll(&mut self) -> Polled;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Replays controller events from a script, timed from the first poll.
pub struct ScriptSource {
    interpreter: ScriptInterpreter<InputEvent>,
    start: Option<Instant>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum Polled {
    /// Nothing new
    Idle,

    /// New events, oldest first
    Events(Vec<InputEvent>),

    /// The source will never produce another event
    Finished,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScriptSource {
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        Ok(Self::from_interpreter(ScriptInterpreter::new(script_path)?))
    }

    pub fn from_interpreter(interpreter: ScriptInterpreter<InputEvent>) -> Self {
        Self {
            interpreter,
            start: None,
        }
    }

    pub fn num_events(&self) -> usize {
        self.interpreter.get_num_items()
    }

    /// Time of the last event in the script, seconds.
    pub fn duration(&self) -> f64 {
        self.interpreter.get_duration()
    }

    /// Events due `elapsed_s` seconds into the script.
    pub fn poll_at(&mut self, elapsed_s: f64) -> Polled {
        match self.interpreter.get_pending(elapsed_s) {
            Pending::None => Polled::Idle,
            Pending::Some(events) => Polled::Events(events),
            Pending::EndOfScript => Polled::Finished,
        }
    }
}

impl InputSource for ScriptSource {
    fn poll(&mut self) -> Polled {
        let start = *self.start.get_or_insert_with(Instant::now);
        self.poll_at(start.elapsed().as_secs_f64())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::input::{Axis, Button};

    const SCRIPT: &str = r#"
        0.0: {"type": "button", "button": "dpad_up"};
        0.5: {"type": "axis", "axis": "left_x", "value": 20000};
        0.5: {"type": "axis", "axis": "left_x", "value": 0};     back to centre
        2.0: {"type": "axis", "axis": "trigger_right", "value": 16384};
    "#;

    #[test]
    fn test_script_replay() {
        let mut source =
            ScriptSource::from_interpreter(ScriptInterpreter::from_str(SCRIPT).unwrap());

        assert_eq!(source.num_events(), 4);
        assert_eq!(source.duration(), 2.0);

        assert_eq!(
            source.poll_at(0.1),
            Polled::Events(vec![InputEvent::Button {
                button: Button::DpadUp
            }])
        );
        assert_eq!(source.poll_at(0.2), Polled::Idle);
        assert_eq!(
            source.poll_at(1.0),
            Polled::Events(vec![
                InputEvent::Axis {
                    axis: Axis::LeftX,
                    value: 20000
                },
                InputEvent::Axis {
                    axis: Axis::LeftX,
                    value: 0
                },
            ])
        );
        assert!(matches!(source.poll_at(3.0), Polled::Events(v) if v.len() == 1));
        assert_eq!(source.poll_at(4.0), Polled::Finished);
    }

    #[test]
    fn test_first_poll_starts_the_clock() {
        let mut source =
            ScriptSource::from_interpreter(ScriptInterpreter::from_str(SCRIPT).unwrap());

        assert!(matches!(source.poll(), Polled::Events(v) if v.len() == 1));
        assert_eq!(source.poll(), Polled::Idle);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptSource::new("/no/such/input/script.txt"),
            Err(ScriptError::ScriptNotFound(_))
        ));
        assert!(matches!(
            ScriptInterpreter::<InputEvent>::from_str(r#"1.0: {"type": "wiggle"};"#),
            Err(ScriptError::InvalidItem(_, _))
        ));
    }
}
