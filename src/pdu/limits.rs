//! Quantity and byte-count caps for the function codes that carry them.
//!
//! These are the PDU-level caps from the Modbus application protocol
//! specification. §9's open question ("exact quantity limits for FC 23 and
//! file records differ between spec versions") is resolved here by exposing
//! them as `pub const`s a caller can shadow via [`Limits`] rather than
//! hard-coding them at every call site.

/// Configurable caps, defaulting to the standard Modbus limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Limits {
    pub max_read_bits: u16,
    pub max_read_registers: u16,
    pub max_write_bits: u16,
    pub max_write_registers: u16,
    pub max_rw_read_registers: u16,
    pub max_rw_write_registers: u16,
    pub max_file_record_length: u16,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_read_bits: 2000,
            max_read_registers: 125,
            max_write_bits: 1968,
            max_write_registers: 123,
            max_rw_read_registers: 125,
            max_rw_write_registers: 121,
            max_file_record_length: 0x7D,
        }
    }
}
