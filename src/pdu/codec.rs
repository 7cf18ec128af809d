//! PDU encode/decode for the full function-code matrix.
//!
//! Decoding validates ranges, quantity/byte-count consistency, and mask
//! width; a validation failure is an [`Error::InvalidMessage`], which the
//! framer layer treats as a malformed frame (resync), never as a Modbus
//! exception reply — exceptions are a peer's deliberate answer, not a
//! decode-time judgment about its request.

use crate::error::{Error, Result};

use super::bits::{byte_count_for, pack_bits, unpack_bits};
use super::codes::{ExceptionCode, FunctionCode};
use super::limits::Limits;
use super::types::{
    ExceptionResponse, FileRecordReadRequest, FileRecordReadResponse, FileRecordWriteRequest,
    PduReply, Request, Response,
};

fn read_u16(data: &[u8], offset: usize, what: &str) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::invalid_message(format!("{what}: PDU too short at offset {offset}")))
}

fn need_len(data: &[u8], min: usize, what: &str) -> Result<()> {
    if data.len() < min {
        return Err(Error::invalid_message(format!(
            "{what}: expected at least {min} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

/// Encodes a request PDU, including its function-code byte.
pub fn encode_request(req: &Request) -> Vec<u8> {
    let mut out = vec![req.function_code().code()];
    match req {
        Request::ReadCoils { address, quantity }
        | Request::ReadDiscreteInputs { address, quantity }
        | Request::ReadHoldingRegisters { address, quantity }
        | Request::ReadInputRegisters { address, quantity } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&quantity.to_be_bytes());
        }
        Request::WriteSingleCoil { address, value } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&(if *value { 0xFF00u16 } else { 0x0000u16 }).to_be_bytes());
        }
        Request::WriteSingleRegister { address, value } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        Request::ReadExceptionStatus
        | Request::GetCommEventCounter
        | Request::GetCommEventLog
        | Request::ReportServerId => {}
        Request::Diagnostics { sub_function, data } => {
            out.extend_from_slice(&sub_function.to_be_bytes());
            for word in data {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Request::WriteMultipleCoils { address, values } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&(values.len() as u16).to_be_bytes());
            let packed = pack_bits(values);
            out.push(packed.len() as u8);
            out.extend_from_slice(&packed);
        }
        Request::WriteMultipleRegisters { address, values } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&(values.len() as u16).to_be_bytes());
            out.push((values.len() * 2) as u8);
            for word in values {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Request::ReadFileRecord { requests } => {
            out.push((requests.len() * 7) as u8);
            for r in requests {
                out.push(0x06);
                out.extend_from_slice(&r.file_number.to_be_bytes());
                out.extend_from_slice(&r.record_number.to_be_bytes());
                out.extend_from_slice(&r.record_length.to_be_bytes());
            }
        }
        Request::WriteFileRecord { requests } => {
            let total_len: usize = requests.iter().map(|r| 7 + r.data.len() * 2).sum();
            out.push(total_len as u8);
            for r in requests {
                out.push(0x06);
                out.extend_from_slice(&r.file_number.to_be_bytes());
                out.extend_from_slice(&r.record_number.to_be_bytes());
                out.extend_from_slice(&(r.data.len() as u16).to_be_bytes());
                for word in &r.data {
                    out.extend_from_slice(&word.to_be_bytes());
                }
            }
        }
        Request::MaskWriteRegister {
            address,
            and_mask,
            or_mask,
        } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&and_mask.to_be_bytes());
            out.extend_from_slice(&or_mask.to_be_bytes());
        }
        Request::ReadWriteMultipleRegisters {
            read_address,
            read_quantity,
            write_address,
            write_values,
        } => {
            out.extend_from_slice(&read_address.to_be_bytes());
            out.extend_from_slice(&read_quantity.to_be_bytes());
            out.extend_from_slice(&write_address.to_be_bytes());
            out.extend_from_slice(&(write_values.len() as u16).to_be_bytes());
            out.push((write_values.len() * 2) as u8);
            for word in write_values {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Request::ReadFifoQueue { address } => {
            out.extend_from_slice(&address.to_be_bytes());
        }
        Request::ReadDeviceIdentification {
            read_device_id_code,
            object_id,
        } => {
            out.push(0x0E); // MEI type 14: device identification
            out.push(*read_device_id_code);
            out.push(*object_id);
        }
    }
    out
}

/// Decodes a request PDU (function-code byte included), validating ranges
/// and quantity/byte-count consistency against `limits`.
pub fn decode_request(pdu: &[u8], limits: &Limits) -> Result<Request> {
    need_len(pdu, 1, "request")?;
    let fc = FunctionCode::try_from(pdu[0])?;
    let data = &pdu[1..];

    let req = match fc {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            need_len(data, 4, "read request")?;
            let address = read_u16(data, 0, "read request")?;
            let quantity = read_u16(data, 2, "read request")?;
            if quantity == 0 || quantity > limits.max_read_bits {
                return Err(Error::invalid_message(format!(
                    "quantity {quantity} out of range 1..={}",
                    limits.max_read_bits
                )));
            }
            check_address_range(address, quantity)?;
            if fc == FunctionCode::ReadCoils {
                Request::ReadCoils { address, quantity }
            } else {
                Request::ReadDiscreteInputs { address, quantity }
            }
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            need_len(data, 4, "read request")?;
            let address = read_u16(data, 0, "read request")?;
            let quantity = read_u16(data, 2, "read request")?;
            if quantity == 0 || quantity > limits.max_read_registers {
                return Err(Error::invalid_message(format!(
                    "quantity {quantity} out of range 1..={}",
                    limits.max_read_registers
                )));
            }
            check_address_range(address, quantity)?;
            if fc == FunctionCode::ReadHoldingRegisters {
                Request::ReadHoldingRegisters { address, quantity }
            } else {
                Request::ReadInputRegisters { address, quantity }
            }
        }
        FunctionCode::WriteSingleCoil => {
            need_len(data, 4, "write single coil")?;
            let address = read_u16(data, 0, "write single coil")?;
            let raw = read_u16(data, 2, "write single coil")?;
            let value = match raw {
                0xFF00 => true,
                0x0000 => false,
                other => {
                    return Err(Error::invalid_message(format!(
                        "write single coil value must be 0x0000 or 0xFF00, got 0x{other:04X}"
                    )))
                }
            };
            Request::WriteSingleCoil { address, value }
        }
        FunctionCode::WriteSingleRegister => {
            need_len(data, 4, "write single register")?;
            Request::WriteSingleRegister {
                address: read_u16(data, 0, "write single register")?,
                value: read_u16(data, 2, "write single register")?,
            }
        }
        FunctionCode::ReadExceptionStatus => Request::ReadExceptionStatus,
        FunctionCode::GetCommEventCounter => Request::GetCommEventCounter,
        FunctionCode::GetCommEventLog => Request::GetCommEventLog,
        FunctionCode::ReportServerId => Request::ReportServerId,
        FunctionCode::Diagnostics => {
            need_len(data, 2, "diagnostics")?;
            let sub_function = read_u16(data, 0, "diagnostics")?;
            let words = data[2..]
                .chunks(2)
                .filter(|c| c.len() == 2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Request::Diagnostics {
                sub_function,
                data: words,
            }
        }
        FunctionCode::WriteMultipleCoils => {
            need_len(data, 5, "write multiple coils")?;
            let address = read_u16(data, 0, "write multiple coils")?;
            let quantity = read_u16(data, 2, "write multiple coils")?;
            let byte_count = data[4];
            if quantity == 0 || quantity > limits.max_write_bits {
                return Err(Error::invalid_message(format!(
                    "quantity {quantity} out of range 1..={}",
                    limits.max_write_bits
                )));
            }
            check_address_range(address, quantity)?;
            if byte_count != byte_count_for(quantity) {
                return Err(Error::invalid_message(format!(
                    "byte count {byte_count} does not match quantity {quantity}"
                )));
            }
            need_len(data, 5 + byte_count as usize, "write multiple coils")?;
            let values = unpack_bits(&data[5..5 + byte_count as usize], quantity as usize);
            Request::WriteMultipleCoils { address, values }
        }
        FunctionCode::WriteMultipleRegisters => {
            need_len(data, 5, "write multiple registers")?;
            let address = read_u16(data, 0, "write multiple registers")?;
            let quantity = read_u16(data, 2, "write multiple registers")?;
            let byte_count = data[4];
            if quantity == 0 || quantity > limits.max_write_registers {
                return Err(Error::invalid_message(format!(
                    "quantity {quantity} out of range 1..={}",
                    limits.max_write_registers
                )));
            }
            check_address_range(address, quantity)?;
            if byte_count as usize != quantity as usize * 2 {
                return Err(Error::invalid_message(format!(
                    "byte count {byte_count} does not match quantity {quantity}"
                )));
            }
            need_len(data, 5 + byte_count as usize, "write multiple registers")?;
            let values = data[5..5 + byte_count as usize]
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Request::WriteMultipleRegisters { address, values }
        }
        FunctionCode::ReadFileRecord => {
            need_len(data, 1, "read file record")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "read file record")?;
            let requests = decode_file_record_read_requests(&data[1..1 + byte_count])?;
            Request::ReadFileRecord { requests }
        }
        FunctionCode::WriteFileRecord => {
            need_len(data, 1, "write file record")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "write file record")?;
            let requests = decode_file_record_write_requests(&data[1..1 + byte_count])?;
            Request::WriteFileRecord { requests }
        }
        FunctionCode::MaskWriteRegister => {
            need_len(data, 6, "mask write register")?;
            Request::MaskWriteRegister {
                address: read_u16(data, 0, "mask write register")?,
                and_mask: read_u16(data, 2, "mask write register")?,
                or_mask: read_u16(data, 4, "mask write register")?,
            }
        }
        FunctionCode::ReadWriteMultipleRegisters => {
            need_len(data, 9, "read/write multiple registers")?;
            let read_address = read_u16(data, 0, "read/write multiple registers")?;
            let read_quantity = read_u16(data, 2, "read/write multiple registers")?;
            let write_address = read_u16(data, 4, "read/write multiple registers")?;
            let write_quantity = read_u16(data, 6, "read/write multiple registers")?;
            let byte_count = data[8];
            if read_quantity == 0 || read_quantity > limits.max_rw_read_registers {
                return Err(Error::invalid_message("read quantity out of range"));
            }
            if write_quantity == 0 || write_quantity > limits.max_rw_write_registers {
                return Err(Error::invalid_message("write quantity out of range"));
            }
            if byte_count as usize != write_quantity as usize * 2 {
                return Err(Error::invalid_message(
                    "byte count does not match write quantity",
                ));
            }
            check_address_range(read_address, read_quantity)?;
            check_address_range(write_address, write_quantity)?;
            need_len(data, 9 + byte_count as usize, "read/write multiple registers")?;
            let write_values = data[9..9 + byte_count as usize]
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Request::ReadWriteMultipleRegisters {
                read_address,
                read_quantity,
                write_address,
                write_values,
            }
        }
        FunctionCode::ReadFifoQueue => {
            need_len(data, 2, "read FIFO queue")?;
            Request::ReadFifoQueue {
                address: read_u16(data, 0, "read FIFO queue")?,
            }
        }
        FunctionCode::EncapsulatedInterfaceTransport => {
            need_len(data, 3, "device identification request")?;
            if data[0] != 0x0E {
                return Err(Error::invalid_message(format!(
                    "unsupported MEI type 0x{:02X}",
                    data[0]
                )));
            }
            Request::ReadDeviceIdentification {
                read_device_id_code: data[1],
                object_id: data[2],
            }
        }
    };
    Ok(req)
}

fn check_address_range(address: u16, quantity: u16) -> Result<()> {
    if (address as u32) + (quantity as u32) > 0x1_0000 {
        return Err(Error::invalid_message(format!(
            "address range {address}..{} wraps past 0xFFFF",
            address as u32 + quantity as u32
        )));
    }
    Ok(())
}

fn decode_file_record_read_requests(data: &[u8]) -> Result<Vec<FileRecordReadRequest>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        need_len(&data[offset..], 7, "read file record sub-request")?;
        if data[offset] != 0x06 {
            return Err(Error::invalid_message(format!(
                "unsupported file record reference type 0x{:02X}",
                data[offset]
            )));
        }
        out.push(FileRecordReadRequest {
            file_number: read_u16(data, offset + 1, "read file record sub-request")?,
            record_number: read_u16(data, offset + 3, "read file record sub-request")?,
            record_length: read_u16(data, offset + 5, "read file record sub-request")?,
        });
        offset += 7;
    }
    Ok(out)
}

fn decode_file_record_write_requests(data: &[u8]) -> Result<Vec<FileRecordWriteRequest>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        need_len(&data[offset..], 7, "write file record sub-request")?;
        if data[offset] != 0x06 {
            return Err(Error::invalid_message(format!(
                "unsupported file record reference type 0x{:02X}",
                data[offset]
            )));
        }
        let file_number = read_u16(data, offset + 1, "write file record sub-request")?;
        let record_number = read_u16(data, offset + 3, "write file record sub-request")?;
        let word_count = read_u16(data, offset + 5, "write file record sub-request")? as usize;
        let data_start = offset + 7;
        need_len(&data[data_start..], word_count * 2, "write file record data")?;
        let values = data[data_start..data_start + word_count * 2]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        out.push(FileRecordWriteRequest {
            file_number,
            record_number,
            data: values,
        });
        offset = data_start + word_count * 2;
    }
    Ok(out)
}

/// Encodes a successful response or exception into wire bytes, including
/// the function-code byte (with the error bit set for exceptions).
pub fn encode_reply(reply: &PduReply) -> Vec<u8> {
    match reply {
        PduReply::Ok(resp) => encode_response(resp),
        PduReply::Exception(exc) => vec![exc.function_code.code() | 0x80, exc.exception_code.code()],
    }
}

fn encode_response(resp: &Response) -> Vec<u8> {
    let mut out = vec![resp.function_code().code()];
    match resp {
        Response::ReadCoils(values) | Response::ReadDiscreteInputs(values) => {
            let packed = pack_bits(values);
            out.push(packed.len() as u8);
            out.extend_from_slice(&packed);
        }
        Response::ReadHoldingRegisters(values) | Response::ReadInputRegisters(values) => {
            out.push((values.len() * 2) as u8);
            for word in values {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Response::WriteSingleCoil { address, value } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&(if *value { 0xFF00u16 } else { 0x0000u16 }).to_be_bytes());
        }
        Response::WriteSingleRegister { address, value } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        Response::ReadExceptionStatus(status) => out.push(*status),
        Response::Diagnostics { sub_function, data } => {
            out.extend_from_slice(&sub_function.to_be_bytes());
            for word in data {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Response::GetCommEventCounter {
            status,
            event_count,
        } => {
            out.extend_from_slice(&status.to_be_bytes());
            out.extend_from_slice(&event_count.to_be_bytes());
        }
        Response::GetCommEventLog {
            status,
            event_count,
            message_count,
            events,
        } => {
            out.push((6 + events.len()) as u8);
            out.extend_from_slice(&status.to_be_bytes());
            out.extend_from_slice(&event_count.to_be_bytes());
            out.extend_from_slice(&message_count.to_be_bytes());
            out.extend_from_slice(events);
        }
        Response::WriteMultipleCoils { address, quantity }
        | Response::WriteMultipleRegisters { address, quantity } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&quantity.to_be_bytes());
        }
        Response::ReportServerId {
            server_id,
            run_indicator_on,
        } => {
            out.push((server_id.len() + 1) as u8);
            out.extend_from_slice(server_id);
            out.push(if *run_indicator_on { 0xFF } else { 0x00 });
        }
        Response::ReadFileRecord { responses } => {
            let total_len: usize = responses.iter().map(|r| 2 + r.data.len() * 2).sum();
            out.push(total_len as u8);
            for r in responses {
                out.push((1 + r.data.len() * 2) as u8);
                out.push(0x06);
                for word in &r.data {
                    out.extend_from_slice(&word.to_be_bytes());
                }
            }
        }
        Response::WriteFileRecord { requests } => {
            let total_len: usize = requests.iter().map(|r| 7 + r.data.len() * 2).sum();
            out.push(total_len as u8);
            for r in requests {
                out.push(0x06);
                out.extend_from_slice(&r.file_number.to_be_bytes());
                out.extend_from_slice(&r.record_number.to_be_bytes());
                out.extend_from_slice(&(r.data.len() as u16).to_be_bytes());
                for word in &r.data {
                    out.extend_from_slice(&word.to_be_bytes());
                }
            }
        }
        Response::MaskWriteRegister {
            address,
            and_mask,
            or_mask,
        } => {
            out.extend_from_slice(&address.to_be_bytes());
            out.extend_from_slice(&and_mask.to_be_bytes());
            out.extend_from_slice(&or_mask.to_be_bytes());
        }
        Response::ReadWriteMultipleRegisters(values) => {
            out.push((values.len() * 2) as u8);
            for word in values {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Response::ReadFifoQueue(values) => {
            let byte_count = (values.len() * 2 + 2) as u16;
            out.extend_from_slice(&byte_count.to_be_bytes());
            out.extend_from_slice(&(values.len() as u16).to_be_bytes());
            for word in values {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Response::ReadDeviceIdentification {
            more_follows,
            next_object_id,
            objects,
        } => {
            out.push(0x0E);
            out.push(0x01); // read_device_id_code echoed as "basic" by default
            out.push(0x00); // conformity level
            out.push(if *more_follows { 0xFF } else { 0x00 });
            out.push(*next_object_id);
            out.push(objects.len() as u8);
            for (id, value) in objects {
                out.push(*id);
                out.push(value.len() as u8);
                out.extend_from_slice(value);
            }
        }
    }
    out
}

/// Decodes a response/exception PDU (function-code byte included).
pub fn decode_reply(pdu: &[u8]) -> Result<PduReply> {
    need_len(pdu, 1, "reply")?;
    let raw_fc = pdu[0];
    if raw_fc & 0x80 != 0 {
        need_len(pdu, 2, "exception reply")?;
        let function_code = FunctionCode::try_from(raw_fc & 0x7F)?;
        let exception_code = ExceptionCode::from_code(pdu[1])?;
        return Ok(PduReply::Exception(ExceptionResponse::new(
            function_code,
            exception_code,
        )));
    }

    let fc = FunctionCode::try_from(raw_fc)?;
    let data = &pdu[1..];
    let resp = match fc {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            need_len(data, 1, "read response")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "read response")?;
            let values = unpack_bits(&data[1..1 + byte_count], byte_count * 8);
            if fc == FunctionCode::ReadCoils {
                Response::ReadCoils(values)
            } else {
                Response::ReadDiscreteInputs(values)
            }
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            need_len(data, 1, "read response")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "read response")?;
            let values = data[1..1 + byte_count]
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            if fc == FunctionCode::ReadHoldingRegisters {
                Response::ReadHoldingRegisters(values)
            } else {
                Response::ReadInputRegisters(values)
            }
        }
        FunctionCode::WriteSingleCoil => {
            need_len(data, 4, "write single coil response")?;
            Response::WriteSingleCoil {
                address: read_u16(data, 0, "write single coil response")?,
                value: read_u16(data, 2, "write single coil response")? == 0xFF00,
            }
        }
        FunctionCode::WriteSingleRegister => {
            need_len(data, 4, "write single register response")?;
            Response::WriteSingleRegister {
                address: read_u16(data, 0, "write single register response")?,
                value: read_u16(data, 2, "write single register response")?,
            }
        }
        FunctionCode::ReadExceptionStatus => {
            need_len(data, 1, "read exception status response")?;
            Response::ReadExceptionStatus(data[0])
        }
        FunctionCode::Diagnostics => {
            need_len(data, 2, "diagnostics response")?;
            Response::Diagnostics {
                sub_function: read_u16(data, 0, "diagnostics response")?,
                data: data[2..]
                    .chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            }
        }
        FunctionCode::GetCommEventCounter => {
            need_len(data, 4, "comm event counter response")?;
            Response::GetCommEventCounter {
                status: read_u16(data, 0, "comm event counter response")?,
                event_count: read_u16(data, 2, "comm event counter response")?,
            }
        }
        FunctionCode::GetCommEventLog => {
            need_len(data, 7, "comm event log response")?;
            let byte_count = data[0] as usize;
            if byte_count < 6 {
                return Err(Error::invalid_message("comm event log byte count too small"));
            }
            need_len(data, 1 + byte_count, "comm event log response")?;
            Response::GetCommEventLog {
                status: read_u16(data, 1, "comm event log response")?,
                event_count: read_u16(data, 3, "comm event log response")?,
                message_count: read_u16(data, 5, "comm event log response")?,
                events: data[7..1 + byte_count].to_vec(),
            }
        }
        FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
            need_len(data, 4, "write multiple response")?;
            let address = read_u16(data, 0, "write multiple response")?;
            let quantity = read_u16(data, 2, "write multiple response")?;
            if fc == FunctionCode::WriteMultipleCoils {
                Response::WriteMultipleCoils { address, quantity }
            } else {
                Response::WriteMultipleRegisters { address, quantity }
            }
        }
        FunctionCode::ReportServerId => {
            need_len(data, 1, "report server id response")?;
            let byte_count = data[0] as usize;
            if byte_count < 1 {
                return Err(Error::invalid_message("report server id byte count must be >= 1"));
            }
            need_len(data, 1 + byte_count, "report server id response")?;
            let run_indicator_on = *data.get(byte_count).unwrap_or(&0) == 0xFF;
            Response::ReportServerId {
                server_id: data[1..byte_count].to_vec(),
                run_indicator_on,
            }
        }
        FunctionCode::ReadFileRecord => {
            need_len(data, 1, "read file record response")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "read file record response")?;
            let mut responses = Vec::new();
            let mut offset = 1;
            let end = 1 + byte_count;
            while offset < end {
                need_len(&data[offset..], 2, "read file record sub-response")?;
                let resp_len = data[offset] as usize;
                let ref_type = data[offset + 1];
                if ref_type != 0x06 {
                    return Err(Error::invalid_message("unsupported file record reference type"));
                }
                if resp_len == 0 {
                    return Err(Error::invalid_message("file record response length must be >= 1"));
                }
                let word_count = (resp_len - 1) / 2;
                let data_start = offset + 2;
                need_len(&data[data_start..], word_count * 2, "read file record data")?;
                let values = data[data_start..data_start + word_count * 2]
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                responses.push(FileRecordReadResponse { data: values });
                offset = data_start + word_count * 2;
            }
            Response::ReadFileRecord { responses }
        }
        FunctionCode::WriteFileRecord => {
            need_len(data, 1, "write file record response")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "write file record response")?;
            Response::WriteFileRecord {
                requests: decode_file_record_write_requests(&data[1..1 + byte_count])?,
            }
        }
        FunctionCode::MaskWriteRegister => {
            need_len(data, 6, "mask write register response")?;
            Response::MaskWriteRegister {
                address: read_u16(data, 0, "mask write register response")?,
                and_mask: read_u16(data, 2, "mask write register response")?,
                or_mask: read_u16(data, 4, "mask write register response")?,
            }
        }
        FunctionCode::ReadWriteMultipleRegisters => {
            need_len(data, 1, "read/write response")?;
            let byte_count = data[0] as usize;
            need_len(data, 1 + byte_count, "read/write response")?;
            Response::ReadWriteMultipleRegisters(
                data[1..1 + byte_count]
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            )
        }
        FunctionCode::ReadFifoQueue => {
            need_len(data, 4, "read FIFO queue response")?;
            let count = read_u16(data, 2, "read FIFO queue response")? as usize;
            need_len(data, 4 + count * 2, "read FIFO queue response")?;
            Response::ReadFifoQueue(
                data[4..4 + count * 2]
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            )
        }
        FunctionCode::EncapsulatedInterfaceTransport => {
            need_len(data, 6, "device identification response")?;
            let more_follows = data[3] == 0xFF;
            let next_object_id = data[4];
            let object_count = data[5] as usize;
            let mut objects = Vec::with_capacity(object_count);
            let mut offset = 6;
            for _ in 0..object_count {
                need_len(&data[offset..], 2, "device identification object")?;
                let id = data[offset];
                let len = data[offset + 1] as usize;
                need_len(&data[offset + 2..], len, "device identification object value")?;
                objects.push((id, data[offset + 2..offset + 2 + len].to_vec()));
                offset += 2 + len;
            }
            Response::ReadDeviceIdentification {
                more_follows,
                next_object_id,
                objects,
            }
        }
    };
    Ok(PduReply::Ok(resp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_holding_registers_request_round_trips() {
        let req = Request::ReadHoldingRegisters {
            address: 0,
            quantity: 1,
        };
        let bytes = encode_request(&req);
        assert_eq!(bytes, vec![0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(decode_request(&bytes, &Limits::default()).unwrap(), req);
    }

    #[test]
    fn read_holding_registers_response_matches_literal_scenario() {
        // Scenario 1 from the testable-properties section: hr = [17, 17, ...].
        let reply = PduReply::Ok(Response::ReadHoldingRegisters(vec![17]));
        assert_eq!(encode_reply(&reply), vec![0x03, 0x02, 0x00, 0x11]);
    }

    #[test]
    fn illegal_address_exception_round_trips() {
        let reply = PduReply::Exception(ExceptionResponse::new(
            FunctionCode::ReadHoldingRegisters,
            ExceptionCode::IllegalDataAddress,
        ));
        let bytes = encode_reply(&reply);
        assert_eq!(bytes, vec![0x83, 0x02]);
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn write_multiple_coils_round_trips() {
        let req = Request::WriteMultipleCoils {
            address: 1,
            values: vec![true; 21],
        };
        let bytes = encode_request(&req);
        assert_eq!(decode_request(&bytes, &Limits::default()).unwrap(), req);
    }

    #[test]
    fn byte_count_mismatch_is_invalid_message_not_exception() {
        let mut bytes = encode_request(&Request::WriteMultipleRegisters {
            address: 0,
            values: vec![1, 2, 3],
        });
        bytes[4] = 4; // corrupt byte_count
        assert!(matches!(
            decode_request(&bytes, &Limits::default()),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn address_range_wrap_is_rejected() {
        let bytes = encode_request(&Request::ReadHoldingRegisters {
            address: 0xFFFF,
            quantity: 2,
        });
        assert!(decode_request(&bytes, &Limits::default()).is_err());
    }

    #[test]
    fn quantity_zero_is_rejected() {
        let bytes = [0x03, 0x00, 0x00, 0x00, 0x00];
        assert!(decode_request(&bytes, &Limits::default()).is_err());
    }

    #[test]
    fn mask_write_register_round_trips() {
        let req = Request::MaskWriteRegister {
            address: 4,
            and_mask: 0x00F2,
            or_mask: 0x0025,
        };
        let bytes = encode_request(&req);
        assert_eq!(decode_request(&bytes, &Limits::default()).unwrap(), req);
    }

    #[test]
    fn read_write_multiple_registers_round_trips() {
        let req = Request::ReadWriteMultipleRegisters {
            read_address: 3,
            read_quantity: 6,
            write_address: 14,
            write_values: vec![0xFF, 0xFF, 0xFF],
        };
        let bytes = encode_request(&req);
        assert_eq!(decode_request(&bytes, &Limits::default()).unwrap(), req);
    }

    #[test]
    fn file_record_round_trips() {
        let req = Request::ReadFileRecord {
            requests: vec![FileRecordReadRequest {
                file_number: 4,
                record_number: 1,
                record_length: 2,
            }],
        };
        let bytes = encode_request(&req);
        assert_eq!(decode_request(&bytes, &Limits::default()).unwrap(), req);

        let reply = PduReply::Ok(Response::ReadFileRecord {
            responses: vec![FileRecordReadResponse {
                data: vec![0x000A, 0x0102],
            }],
        });
        let bytes = encode_reply(&reply);
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn device_identification_round_trips() {
        let reply = PduReply::Ok(Response::ReadDeviceIdentification {
            more_follows: false,
            next_object_id: 0,
            objects: vec![(0x00, b"modbus_stack".to_vec())],
        });
        let bytes = encode_reply(&reply);
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }
}
