//! # Network parameters
//!
//! Shared between every executable, loaded from `net.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::envelope::{CAR_PEER_ID, OPERATOR_PEER_ID};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Addresses and identities of the network peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Address the router listens on, e.g. `0.0.0.0:8080`
    pub router_bind: String,

    /// URL peers use to reach the router, without query string, e.g. `ws://localhost:8080/`
    pub router_url: String,

    /// Address the car binds its UDP frame receiver to
    pub car_udp_bind: String,

    /// Address the operator station sends UDP frames to
    pub car_udp_target: String,

    /// Source tag of the car on the router
    #[serde(default = "default_car_source")]
    pub car_source: String,

    /// Source tag of the operator station on the router
    #[serde(default = "default_operator_source")]
    pub operator_source: String,

    /// Read timeout of the UDP frame receiver
    ///
    /// Units: milliseconds
    #[serde(default = "default_udp_timeout_ms")]
    pub udp_recv_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetParams {
    /// Router URL carrying the given source tag in its query string.
    pub fn router_url_for(&self, source: &str) -> String {
        let sep = if self.router_url.contains('?') { '&' } else { '?' };
        format!("{}{}source={}", self.router_url, sep, source)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_car_source() -> String {
    CAR_PEER_ID.into()
}

fn default_operator_source() -> String {
    OPERATOR_PEER_ID.into()
}

fn default_udp_timeout_ms() -> u64 {
    1000
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_router_url_for() {
        let params = NetParams {
            router_bind: "0.0.0.0:8080".into(),
            router_url: "ws://localhost:8080/".into(),
            car_udp_bind: "0.0.0.0:14550".into(),
            car_udp_target: "127.0.0.1:14550".into(),
            car_source: default_car_source(),
            operator_source: default_operator_source(),
            udp_recv_timeout_ms: default_udp_timeout_ms(),
        };

        assert_eq!(
            params.router_url_for(&params.car_source),
            "ws://localhost:8080/?source=rc-car-server"
        );
    }
}
