//! # Script interpreter module
//!
//! Replays timestamped JSON items from a script file. Each entry has the form
//!
//! ```text
//! <seconds>: <json>;
//! ```
//!
//! for example `1.5: {"type": "button", "button": "dpad_up"};`. Anything outside an entry
//! (blank lines, notes after the `;`) is ignored. The operator station uses this to drive the
//! controller mapping without a physical game pad.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An item which is scripted to occur at a specific time.
struct Entry<T> {
    /// The time the item is supposed to execute at
    exec_time_s: f64,

    item: T
}

/// A script interpreter.
///
/// After loading a script use `.get_pending` to acquire the items whose time has come.
pub struct ScriptInterpreter<T> {
    entries: VecDeque<Entry<T>>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Could not build the script pattern: {0}")]
    PatternError(regex::Error),

    #[error("Script contains an invalid item at {0} s: {1}")]
    InvalidItem(f64, serde_json::Error)
}

pub enum Pending<T> {
    None,
    Some(Vec<T>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: DeserializeOwned> ScriptInterpreter<T> {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = script_path.as_ref();

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path.display().to_string()));
        }

        let script = fs::read_to_string(path)
            .map_err(ScriptError::ScriptLoadError)?;

        Self::from_str(&script)
    }

    /// Create a new interpreter from the contents of a script.
    pub fn from_str(script: &str) -> Result<Self, ScriptError> {
        let re = match RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
        {
            Ok(r) => r,
            Err(e) => return Err(ScriptError::PatternError(e))
        };

        let mut entries = VecDeque::new();

        for cap in re.captures_iter(script) {
            // Groups 1 and 3 are not optional so are always present in a match
            let (time_str, item_str) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(i)) => (t.as_str(), i.as_str()),
                _ => continue
            };

            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            let item = serde_json::from_str(item_str)
                .map_err(|e| ScriptError::InvalidItem(exec_time_s, e))?;

            entries.push_back(Entry { exec_time_s, item });
        }

        if entries.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter { entries })
    }
}

impl<T> ScriptInterpreter<T> {
    /// Return the items due at `current_time_s` (seconds since the script started).
    pub fn get_pending(&mut self, current_time_s: f64) -> Pending<T> {
        if self.entries.is_empty() {
            return Pending::EndOfScript
        }

        let mut items = vec![];

        while let Some(entry) = self.entries.front() {
            if entry.exec_time_s > current_time_s {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                items.push(entry.item);
            }
        }

        if items.is_empty() {
            Pending::None
        }
        else {
            Pending::Some(items)
        }
    }

    /// Get the number of items left in the script
    pub fn get_num_items(&self) -> usize {
        self.entries.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.entries.back() {
            Some(e) => e.exec_time_s,
            None => 0f64
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
