//! Server-wide configuration: the control surface of §6 ("server control
//! surface") plus the quantity caps dispatch needs.

use std::sync::Arc;

use crate::pdu::{Limits, PduReply};

use super::identification::ModbusDeviceIdentification;

/// Rewrites a response PDU just before it is encoded onto the wire. The
/// hook's exact use is source-specific; a server that doesn't set one
/// loses nothing.
pub type ResponseManipulator = Arc<dyn Fn(PduReply) -> PduReply + Send + Sync>;

#[derive(Clone)]
pub struct ServerConfig {
    pub identification: ModbusDeviceIdentification,
    pub limits: Limits,
    /// When set, a request addressed to device id 0 is applied to every
    /// configured device and produces no response. When unset, device id
    /// 0 is looked up like any other address.
    pub broadcast_enable: bool,
    /// When set, a request for an unconfigured device id is dropped
    /// silently instead of answered with exception 0x0B
    /// (`GatewayTargetDeviceFailedToRespond`).
    pub ignore_missing_devices: bool,
    pub response_manipulator: Option<ResponseManipulator>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            identification: ModbusDeviceIdentification::default(),
            limits: Limits::default(),
            broadcast_enable: true,
            ignore_missing_devices: false,
            response_manipulator: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("identification", &self.identification)
            .field("limits", &self.limits)
            .field("broadcast_enable", &self.broadcast_enable)
            .field("ignore_missing_devices", &self.ignore_missing_devices)
            .field("response_manipulator", &self.response_manipulator.is_some())
            .finish()
    }
}
