//! Client configuration: the enumerated options of §6 ("client
//! configuration") plus the quantity caps the builders preflight-check
//! before a request ever reaches the wire.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pdu::Limits;
use crate::transaction::Concurrency;

/// Which framing this client speaks, matching the enumerated
/// `framer ∈ {SOCKET, TLS, RTU, ASCII}` client option. `Socket` is plain
/// MBAP over TCP (pymodbus's naming: the "socket" framer, not to be
/// confused with [`crate::frame::SocketFramer`], which is this crate's
/// name for the UDP-carried variant of the same MBAP layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramerKind {
    Socket,
    Tls,
    Rtu,
    Ascii,
}

impl FramerKind {
    /// The per-transport concurrency contract a framer kind implies
    /// (§4.F): MBAP carriage allows multiple outstanding requests, serial
    /// carriage allows exactly one.
    pub fn concurrency(self) -> Concurrency {
        match self {
            Self::Socket | Self::Tls => Concurrency::Concurrent,
            Self::Rtu | Self::Ascii => Concurrency::Serialized,
        }
    }
}

/// Client-wide configuration (§6's enumerated client options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub framer: FramerKind,
    pub timeout_connect: Duration,
    pub timeout_request: Duration,
    /// Initial delay before the first reconnect attempt after a
    /// connection loss; doubles on each subsequent attempt up to
    /// `reconnect_delay_max`.
    pub reconnect_delay: Duration,
    /// `Duration::ZERO` disables reconnect: a dropped connection stays
    /// dropped until the caller creates a new client.
    pub reconnect_delay_max: Duration,
    pub retries: u32,
    pub source_address: Option<SocketAddr>,
    /// Quantity caps the builders validate against before sending;
    /// defaults to the standard Modbus limits (same defaults
    /// [`crate::server::ServerConfig`] uses on the server side).
    pub limits: Limits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            framer: FramerKind::Socket,
            timeout_connect: Duration::from_secs(10),
            timeout_request: Duration::from_secs(3),
            reconnect_delay: Duration::from_millis(100),
            reconnect_delay_max: Duration::from_secs(300),
            retries: 3,
            source_address: None,
            limits: Limits::default(),
        }
    }
}

impl ClientConfig {
    /// Loads a config from a JSON document, e.g. one read from a
    /// deployment's config file.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::parameter(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::parameter(e.to_string()))
    }

    /// Loads a config from a YAML document, the format `comsrv`-style
    /// deployments keep their per-device client settings in.
    pub fn from_yaml(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).map_err(|e| Error::parameter(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::parameter(e.to_string()))
    }
}
