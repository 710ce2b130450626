//! # Router Library
//!
//! Message router forwarding JSON envelopes between the car and the operator station by source
//! tag.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Parameters for the router executable.
pub mod params;

/// Client registry and forwarding.
pub mod router;

/// WebSocket front-end.
pub mod server;
