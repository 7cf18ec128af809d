//! Client-side datatype helpers: convert logical values to/from a register
//! sequence, honoring a configurable word and byte order.
//!
//! Default convention: big-endian across registers (the first register in
//! the sequence holds the most significant 16 bits) and big-endian within
//! each register (as on the wire). This matches the default most Modbus
//! client libraries use for 32/64-bit values spread across registers.

use crate::error::{Error, Result};

/// Order of the 16-bit registers that make up a multi-register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Byte order within each individual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Combined word/byte order used by the datatype helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterOrder {
    pub words: WordOrder,
    pub bytes: ByteOrder,
}

impl RegisterOrder {
    pub const fn new(words: WordOrder, bytes: ByteOrder) -> Self {
        Self { words, bytes }
    }

    fn to_be_bytes(self, registers: &[u16]) -> Vec<u8> {
        let ordered: Vec<u16> = match self.words {
            WordOrder::BigEndian => registers.to_vec(),
            WordOrder::LittleEndian => registers.iter().rev().copied().collect(),
        };
        let mut out = Vec::with_capacity(ordered.len() * 2);
        for reg in ordered {
            let be = reg.to_be_bytes();
            match self.bytes {
                ByteOrder::BigEndian => out.extend_from_slice(&be),
                ByteOrder::LittleEndian => out.extend_from_slice(&[be[1], be[0]]),
            }
        }
        out
    }

    fn from_be_bytes(self, bytes: &[u8]) -> Vec<u16> {
        let mut regs: Vec<u16> = bytes
            .chunks(2)
            .map(|c| match self.bytes {
                ByteOrder::BigEndian => u16::from_be_bytes([c[0], c[1]]),
                ByteOrder::LittleEndian => u16::from_be_bytes([c[1], c[0]]),
            })
            .collect();
        if self.words == WordOrder::LittleEndian {
            regs.reverse();
        }
        regs
    }
}

fn expect_len(registers: &[u16], expected: usize, what: &str) -> Result<()> {
    if registers.len() != expected {
        return Err(Error::parameter(format!(
            "{what} needs exactly {expected} register(s), got {}",
            registers.len()
        )));
    }
    Ok(())
}

pub fn registers_to_u32(registers: &[u16], order: RegisterOrder) -> Result<u32> {
    expect_len(registers, 2, "u32")?;
    let bytes = order.to_be_bytes(registers);
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

pub fn u32_to_registers(value: u32, order: RegisterOrder) -> Vec<u16> {
    order.from_be_bytes(&value.to_be_bytes())
}

pub fn registers_to_i32(registers: &[u16], order: RegisterOrder) -> Result<i32> {
    registers_to_u32(registers, order).map(|v| v as i32)
}

pub fn i32_to_registers(value: i32, order: RegisterOrder) -> Vec<u16> {
    u32_to_registers(value as u32, order)
}

pub fn registers_to_u64(registers: &[u16], order: RegisterOrder) -> Result<u64> {
    expect_len(registers, 4, "u64")?;
    let bytes = order.to_be_bytes(registers);
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

pub fn u64_to_registers(value: u64, order: RegisterOrder) -> Vec<u16> {
    order.from_be_bytes(&value.to_be_bytes())
}

pub fn registers_to_i64(registers: &[u16], order: RegisterOrder) -> Result<i64> {
    registers_to_u64(registers, order).map(|v| v as i64)
}

pub fn i64_to_registers(value: i64, order: RegisterOrder) -> Vec<u16> {
    u64_to_registers(value as u64, order)
}

pub fn registers_to_f32(registers: &[u16], order: RegisterOrder) -> Result<f32> {
    registers_to_u32(registers, order).map(f32::from_bits)
}

pub fn f32_to_registers(value: f32, order: RegisterOrder) -> Vec<u16> {
    u32_to_registers(value.to_bits(), order)
}

pub fn registers_to_f64(registers: &[u16], order: RegisterOrder) -> Result<f64> {
    registers_to_u64(registers, order).map(f64::from_bits)
}

pub fn f64_to_registers(value: f64, order: RegisterOrder) -> Vec<u16> {
    u64_to_registers(value.to_bits(), order)
}

/// Decodes a NUL-trimmed ASCII/UTF-8 string packed two bytes per register.
pub fn registers_to_string(registers: &[u16], order: RegisterOrder) -> String {
    let bytes = order.to_be_bytes(registers);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encodes a string into registers, padding the final register with a NUL
/// byte if the string has an odd length.
pub fn string_to_registers(value: &str, order: RegisterOrder) -> Vec<u16> {
    let mut bytes = value.as_bytes().to_vec();
    if bytes.len() % 2 != 0 {
        bytes.push(0);
    }
    order.from_be_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trips_big_endian() {
        let order = RegisterOrder::default();
        let regs = u32_to_registers(0x1234_5678, order);
        assert_eq!(regs, vec![0x1234, 0x5678]);
        assert_eq!(registers_to_u32(&regs, order).unwrap(), 0x1234_5678);
    }

    #[test]
    fn u32_round_trips_word_swapped() {
        let order = RegisterOrder::new(WordOrder::LittleEndian, ByteOrder::BigEndian);
        let regs = u32_to_registers(0x1234_5678, order);
        assert_eq!(regs, vec![0x5678, 0x1234]);
        assert_eq!(registers_to_u32(&regs, order).unwrap(), 0x1234_5678);
    }

    #[test]
    fn f32_round_trips() {
        let order = RegisterOrder::default();
        let regs = f32_to_registers(3.5, order);
        assert!((registers_to_f32(&regs, order).unwrap() - 3.5).abs() < f32::EPSILON);
    }

    #[test]
    fn wrong_register_count_is_a_parameter_error() {
        let order = RegisterOrder::default();
        assert!(matches!(
            registers_to_u32(&[1], order),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn string_round_trips_with_padding() {
        let order = RegisterOrder::default();
        let regs = string_to_registers("abc", order);
        assert_eq!(regs.len(), 2);
        assert_eq!(registers_to_string(&regs, order), "abc");
    }
}
