//! Function codes and exception codes for the Modbus application protocol.

use crate::error::{Error, Result};

/// Modbus function codes implemented by this stack.
///
/// `repr(u8)` mirrors the wire value so that `code as u8` is always the
/// value that goes on the wire; the error bit (`0x80`) is never part of
/// this enum, it is applied/stripped by the codec layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    ReadExceptionStatus = 0x07,
    Diagnostics = 0x08,
    GetCommEventCounter = 0x0B,
    GetCommEventLog = 0x0C,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
    ReportServerId = 0x11,
    ReadFileRecord = 0x14,
    WriteFileRecord = 0x15,
    MaskWriteRegister = 0x16,
    ReadWriteMultipleRegisters = 0x17,
    ReadFifoQueue = 0x18,
    EncapsulatedInterfaceTransport = 0x2B,
}

impl FunctionCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> u8 {
        code.code()
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::WriteSingleCoil),
            0x06 => Ok(Self::WriteSingleRegister),
            0x07 => Ok(Self::ReadExceptionStatus),
            0x08 => Ok(Self::Diagnostics),
            0x0B => Ok(Self::GetCommEventCounter),
            0x0C => Ok(Self::GetCommEventLog),
            0x0F => Ok(Self::WriteMultipleCoils),
            0x10 => Ok(Self::WriteMultipleRegisters),
            0x11 => Ok(Self::ReportServerId),
            0x14 => Ok(Self::ReadFileRecord),
            0x15 => Ok(Self::WriteFileRecord),
            0x16 => Ok(Self::MaskWriteRegister),
            0x17 => Ok(Self::ReadWriteMultipleRegisters),
            0x18 => Ok(Self::ReadFifoQueue),
            0x2B => Ok(Self::EncapsulatedInterfaceTransport),
            other => Err(Error::not_implemented(format!(
                "function code 0x{other:02X} is not supported by this implementer"
            ))),
        }
    }
}

/// Modbus exception codes, returned in the single payload byte of an
/// exception response (`FC | 0x80`, `exception_code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    Acknowledge = 0x05,
    SlaveDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::IllegalFunction),
            0x02 => Ok(Self::IllegalDataAddress),
            0x03 => Ok(Self::IllegalDataValue),
            0x04 => Ok(Self::SlaveDeviceFailure),
            0x05 => Ok(Self::Acknowledge),
            0x06 => Ok(Self::SlaveDeviceBusy),
            0x07 => Ok(Self::NegativeAcknowledge),
            0x08 => Ok(Self::MemoryParityError),
            0x0A => Ok(Self::GatewayPathUnavailable),
            0x0B => Ok(Self::GatewayTargetDeviceFailedToRespond),
            other => Err(Error::invalid_message(format!(
                "unrecognized exception code 0x{other:02X}"
            ))),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(code: ExceptionCode) -> u8 {
        code.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_code_round_trips() {
        for &(code, byte) in &[
            (FunctionCode::ReadCoils, 0x01),
            (FunctionCode::ReadHoldingRegisters, 0x03),
            (FunctionCode::WriteMultipleRegisters, 0x10),
            (FunctionCode::ReadWriteMultipleRegisters, 0x17),
        ] {
            assert_eq!(code.code(), byte);
            assert_eq!(FunctionCode::try_from(byte).unwrap(), code);
        }
    }

    #[test]
    fn unknown_function_code_is_not_implemented() {
        assert!(matches!(
            FunctionCode::try_from(0x99),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn exception_code_round_trips() {
        assert_eq!(ExceptionCode::IllegalDataAddress.code(), 0x02);
        assert_eq!(
            ExceptionCode::from_code(0x02).unwrap(),
            ExceptionCode::IllegalDataAddress
        );
        assert!(ExceptionCode::from_code(0x42).is_err());
    }
}
