//! # Router Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::router::DEFAULT_CAPACITY;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterExecParams {
    /// Maximum number of connected clients
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Read timeout on each client socket, bounds the delay before routed messages are written
    /// out.
    ///
    /// Units: milliseconds
    pub read_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RouterExecParams {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            read_timeout_ms: 50,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}
