//! Protocol Data Unit (PDU) handling: the transport-independent half of a
//! Modbus exchange — function code plus payload, with no framing, CRC, or
//! transaction bookkeeping attached.

mod bits;
mod codec;
mod codes;
pub mod datatypes;
mod dispatch;
mod limits;
mod types;

pub use bits::{byte_count_for, pack_bits, unpack_bits};
pub use codec::{decode_reply, decode_request, encode_reply, encode_request};
pub use codes::{ExceptionCode, FunctionCode};
pub use dispatch::update_datastore;
pub use limits::Limits;
pub use types::{
    ExceptionResponse, FileRecordReadRequest, FileRecordReadResponse, FileRecordWriteRequest,
    PduReply, Request, Response,
};
