//! Client-side parameter validation.
//!
//! The server validates incoming wire bytes at decode time
//! ([`crate::pdu::decode_request`]); a client never decodes its own
//! outbound request, so it needs the mirror check before building one,
//! else a bad quantity would silently become a malformed frame on the
//! wire instead of an immediate, local [`Error::Parameter`].

use crate::error::{Error, Result};
use crate::pdu::Limits;

fn in_range(quantity: u16, max: u16, what: &str) -> Result<()> {
    if quantity == 0 || quantity > max {
        return Err(Error::parameter(format!(
            "{what} quantity {quantity} out of range 1..={max}"
        )));
    }
    Ok(())
}

fn address_range(address: u16, quantity: u16) -> Result<()> {
    if (address as u32) + (quantity as u32) > 0x1_0000 {
        return Err(Error::parameter(format!(
            "address range {address}..{} wraps past 0xFFFF",
            address as u32 + quantity as u32
        )));
    }
    Ok(())
}

pub fn read_bits(limits: &Limits, address: u16, quantity: u16) -> Result<()> {
    in_range(quantity, limits.max_read_bits, "read")?;
    address_range(address, quantity)
}

pub fn read_registers(limits: &Limits, address: u16, quantity: u16) -> Result<()> {
    in_range(quantity, limits.max_read_registers, "read")?;
    address_range(address, quantity)
}

pub fn write_bits(limits: &Limits, address: u16, quantity: u16) -> Result<()> {
    in_range(quantity, limits.max_write_bits, "write")?;
    address_range(address, quantity)
}

pub fn write_registers(limits: &Limits, address: u16, quantity: u16) -> Result<()> {
    in_range(quantity, limits.max_write_registers, "write")?;
    address_range(address, quantity)
}

pub fn readwrite_registers(
    limits: &Limits,
    read_address: u16,
    read_quantity: u16,
    write_address: u16,
    write_quantity: u16,
) -> Result<()> {
    in_range(read_quantity, limits.max_rw_read_registers, "read")?;
    in_range(write_quantity, limits.max_rw_write_registers, "write")?;
    address_range(read_address, read_quantity)?;
    address_range(write_address, write_quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_is_a_parameter_error() {
        let limits = Limits::default();
        assert!(matches!(
            read_registers(&limits, 0, 0),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn quantity_above_cap_is_a_parameter_error() {
        let limits = Limits::default();
        assert!(matches!(
            read_registers(&limits, 0, 126),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn address_range_wrapping_is_a_parameter_error() {
        let limits = Limits::default();
        assert!(matches!(
            read_registers(&limits, 0xFFFF, 2),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn in_range_request_is_accepted() {
        let limits = Limits::default();
        assert!(read_registers(&limits, 0, 125).is_ok());
    }
}
