//! Tagged-variant PDU request/response types.
//!
//! Per the redesign notes, dispatch is not a table of per-function-code
//! classes: it is a single enum per direction, matched once at the codec
//! boundary and once at the dispatch boundary. Adding a function code means
//! adding a variant plus its two `match` arms, not a new type.

use super::codes::{ExceptionCode, FunctionCode};

/// One read-file-record sub-request (reference type is always `0x06` on
/// the wire and is not modeled here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordReadRequest {
    pub file_number: u16,
    pub record_number: u16,
    /// Length in 16-bit words.
    pub record_length: u16,
}

/// One read-file-record sub-response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordReadResponse {
    pub data: Vec<u16>,
}

/// One write-file-record sub-request; the response echoes this unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordWriteRequest {
    pub file_number: u16,
    pub record_number: u16,
    pub data: Vec<u16>,
}

/// A request PDU, tagged by function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    ReadExceptionStatus,
    Diagnostics { sub_function: u16, data: Vec<u16> },
    GetCommEventCounter,
    GetCommEventLog,
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
    ReportServerId,
    ReadFileRecord { requests: Vec<FileRecordReadRequest> },
    WriteFileRecord { requests: Vec<FileRecordWriteRequest> },
    MaskWriteRegister { address: u16, and_mask: u16, or_mask: u16 },
    ReadWriteMultipleRegisters {
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_values: Vec<u16>,
    },
    ReadFifoQueue { address: u16 },
    ReadDeviceIdentification { read_device_id_code: u8, object_id: u8 },
}

impl Request {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::ReadExceptionStatus => FunctionCode::ReadExceptionStatus,
            Self::Diagnostics { .. } => FunctionCode::Diagnostics,
            Self::GetCommEventCounter => FunctionCode::GetCommEventCounter,
            Self::GetCommEventLog => FunctionCode::GetCommEventLog,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::ReportServerId => FunctionCode::ReportServerId,
            Self::ReadFileRecord { .. } => FunctionCode::ReadFileRecord,
            Self::WriteFileRecord { .. } => FunctionCode::WriteFileRecord,
            Self::MaskWriteRegister { .. } => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters { .. } => FunctionCode::ReadWriteMultipleRegisters,
            Self::ReadFifoQueue { .. } => FunctionCode::ReadFifoQueue,
            Self::ReadDeviceIdentification { .. } => FunctionCode::EncapsulatedInterfaceTransport,
        }
    }
}

/// A successful response PDU, tagged by function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<bool>),
    ReadDiscreteInputs(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    ReadExceptionStatus(u8),
    Diagnostics { sub_function: u16, data: Vec<u16> },
    GetCommEventCounter { status: u16, event_count: u16 },
    GetCommEventLog {
        status: u16,
        event_count: u16,
        message_count: u16,
        events: Vec<u8>,
    },
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
    ReportServerId { server_id: Vec<u8>, run_indicator_on: bool },
    ReadFileRecord { responses: Vec<FileRecordReadResponse> },
    WriteFileRecord { requests: Vec<FileRecordWriteRequest> },
    MaskWriteRegister { address: u16, and_mask: u16, or_mask: u16 },
    ReadWriteMultipleRegisters(Vec<u16>),
    ReadFifoQueue(Vec<u16>),
    ReadDeviceIdentification {
        more_follows: bool,
        next_object_id: u8,
        objects: Vec<(u8, Vec<u8>)>,
    },
}

impl Response {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::ReadExceptionStatus(_) => FunctionCode::ReadExceptionStatus,
            Self::Diagnostics { .. } => FunctionCode::Diagnostics,
            Self::GetCommEventCounter { .. } => FunctionCode::GetCommEventCounter,
            Self::GetCommEventLog { .. } => FunctionCode::GetCommEventLog,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::ReportServerId { .. } => FunctionCode::ReportServerId,
            Self::ReadFileRecord { .. } => FunctionCode::ReadFileRecord,
            Self::WriteFileRecord { .. } => FunctionCode::WriteFileRecord,
            Self::MaskWriteRegister { .. } => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            Self::ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            Self::ReadDeviceIdentification { .. } => FunctionCode::EncapsulatedInterfaceTransport,
        }
    }
}

/// An exception response: `FC | 0x80` followed by one exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function_code: FunctionCode,
    pub exception_code: ExceptionCode,
}

impl ExceptionResponse {
    pub fn new(function_code: FunctionCode, exception_code: ExceptionCode) -> Self {
        Self {
            function_code,
            exception_code,
        }
    }

    /// Always true: mirrors the client façade's `isError()`.
    pub fn is_error(&self) -> bool {
        true
    }
}

/// Either a decoded success response or an exception — the two share a
/// wire representation distinguished only by the high bit of the function
/// code byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduReply {
    Ok(Response),
    Exception(ExceptionResponse),
}

impl PduReply {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Exception(_))
    }
}
