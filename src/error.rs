//! Unified error type for the Modbus stack.
//!
//! Every fallible boundary in this crate — frame decode, PDU decode,
//! transaction dispatch, transport I/O — returns [`Result`]. Protocol-level
//! exceptions (the peer answered with `FC | 0x80`) are *not* represented
//! here: they are a normal result value (see [`crate::pdu::PduResponse`]),
//! not an error, because a well-formed exception response is not a failure
//! of this crate to do its job.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the Modbus stack.
///
/// This enum merges the distilled spec's error "Kinds" (§7) with
/// `pymodbus`'s exception taxonomy (`ConnectionException`,
/// `ModbusIOException`, `ParameterException`, `NoSuchIdException`,
/// `NotImplementedException`, `InvalidMessageReceivedException`,
/// `MessageRegisterException`) one-for-one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport unavailable, or closed mid-exchange.
    #[error("connection error: {0}")]
    Connection(String),

    /// Framing or PDU decoding failure that cannot be resynced on this
    /// connection.
    #[error("I/O error: {0}")]
    Io(String),

    /// No reply arrived before the request deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Programmer misuse: bad address, wrong count, unsupported option.
    /// Never raised by a protocol peer.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// A request addressed an unknown device id.
    #[error("no such device: {0}")]
    NoSuchDevice(String),

    /// The function code is not implemented by this stack.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Well-framed but semantically invalid PDU.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Attempted to register a custom message with a conflicting or
    /// invalid function code.
    #[error("message registration error: {0}")]
    MessageRegister(String),
}

impl Error {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    pub fn no_such_device(id: u8) -> Self {
        Self::NoSuchDevice(format!("device id {id} is not configured"))
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    pub fn message_register(msg: impl Into<String>) -> Self {
        Self::MessageRegister(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_device_formats_id() {
        let err = Error::no_such_device(7);
        assert_eq!(err.to_string(), "no such device: device id 7 is not configured");
    }
}
