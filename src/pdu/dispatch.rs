//! Drives a decoded request PDU against a device context.
//!
//! This is `update_datastore` from the design notes: rather than a table of
//! per-function-code request classes, dispatch is one `match` over the
//! tagged [`Request`] enum. A successful datastore operation becomes
//! `PduReply::Ok`; an [`ExceptionCode`] from the datastore (or a dispatch
//! rule, e.g. an unknown device-identification object) becomes
//! `PduReply::Exception`. Decode-time validation (§pdu::codec) has already
//! ruled out malformed requests, so every `ExceptionCode` produced here is a
//! legitimate protocol exception, not a framing problem.

use crate::datastore::DeviceContext;
use crate::server::identification::ModbusDeviceIdentification;

use super::codes::ExceptionCode;
use super::limits::Limits;
use super::types::{ExceptionResponse, FileRecordReadResponse, PduReply, Request, Response};

/// Sub-function recognized by the diagnostics dispatch (FC 8) as more than
/// an echo. Per SPEC_FULL's supplement, `ReturnQueryData` (0x00) and every
/// other sub-function this implementer doesn't model are treated
/// generically as an echo, matching pymodbus's default handling of the
/// sub-function space.
const DIAG_RESTART_COMMUNICATIONS_OPTION: u16 = 0x0001;

pub fn update_datastore(
    device: &mut DeviceContext,
    request: &Request,
    limits: &Limits,
    identification: &ModbusDeviceIdentification,
) -> PduReply {
    let function_code = request.function_code();
    match apply(device, request, limits, identification) {
        Ok(response) => {
            device.record_comm_event(function_code.code());
            PduReply::Ok(response)
        }
        Err(exception_code) => {
            PduReply::Exception(ExceptionResponse::new(function_code, exception_code))
        }
    }
}

fn apply(
    device: &mut DeviceContext,
    request: &Request,
    _limits: &Limits,
    identification: &ModbusDeviceIdentification,
) -> Result<Response, ExceptionCode> {
    match request {
        Request::ReadCoils { address, quantity } => {
            Ok(Response::ReadCoils(device.read_coils(*address, *quantity)?))
        }
        Request::ReadDiscreteInputs { address, quantity } => Ok(Response::ReadDiscreteInputs(
            device.read_discrete_inputs(*address, *quantity)?,
        )),
        Request::ReadHoldingRegisters { address, quantity } => Ok(Response::ReadHoldingRegisters(
            device.read_holding_registers(*address, *quantity)?,
        )),
        Request::ReadInputRegisters { address, quantity } => Ok(Response::ReadInputRegisters(
            device.read_input_registers(*address, *quantity)?,
        )),
        Request::WriteSingleCoil { address, value } => {
            device.write_coils(*address, &[*value])?;
            Ok(Response::WriteSingleCoil {
                address: *address,
                value: *value,
            })
        }
        Request::WriteSingleRegister { address, value } => {
            device.write_holding_registers(*address, &[*value])?;
            Ok(Response::WriteSingleRegister {
                address: *address,
                value: *value,
            })
        }
        Request::ReadExceptionStatus => Ok(Response::ReadExceptionStatus(device.exception_status())),
        Request::Diagnostics { sub_function, data } => match *sub_function {
            DIAG_RESTART_COMMUNICATIONS_OPTION => {
                device.reset();
                Ok(Response::Diagnostics {
                    sub_function: *sub_function,
                    data: data.clone(),
                })
            }
            // DIAG_RETURN_QUERY_DATA and every other sub-function: echo.
            _ => Ok(Response::Diagnostics {
                sub_function: *sub_function,
                data: data.clone(),
            }),
        },
        Request::GetCommEventCounter => Ok(Response::GetCommEventCounter {
            status: 0x0000,
            event_count: device.comm_event_count(),
        }),
        Request::GetCommEventLog => {
            let events = device.comm_event_log().to_vec();
            Ok(Response::GetCommEventLog {
                status: 0x0000,
                event_count: device.comm_event_count(),
                message_count: events.len() as u16,
                events,
            })
        }
        Request::WriteMultipleCoils { address, values } => {
            device.write_coils(*address, values)?;
            Ok(Response::WriteMultipleCoils {
                address: *address,
                quantity: values.len() as u16,
            })
        }
        Request::WriteMultipleRegisters { address, values } => {
            device.write_holding_registers(*address, values)?;
            Ok(Response::WriteMultipleRegisters {
                address: *address,
                quantity: values.len() as u16,
            })
        }
        Request::ReportServerId => Ok(Response::ReportServerId {
            server_id: identification.server_id_bytes(),
            run_indicator_on: true,
        }),
        Request::ReadFileRecord { requests } => {
            let mut responses = Vec::with_capacity(requests.len());
            for r in requests {
                let data = device
                    .file_records
                    .read(r.file_number, r.record_number, r.record_length)?;
                responses.push(FileRecordReadResponse { data });
            }
            Ok(Response::ReadFileRecord { responses })
        }
        Request::WriteFileRecord { requests } => {
            for r in requests {
                device
                    .file_records
                    .write(r.file_number, r.record_number, r.data.clone());
            }
            Ok(Response::WriteFileRecord {
                requests: requests.clone(),
            })
        }
        Request::MaskWriteRegister {
            address,
            and_mask,
            or_mask,
        } => {
            device.mask_write_register(*address, *and_mask, *or_mask)?;
            Ok(Response::MaskWriteRegister {
                address: *address,
                and_mask: *and_mask,
                or_mask: *or_mask,
            })
        }
        Request::ReadWriteMultipleRegisters {
            read_address,
            read_quantity,
            write_address,
            write_values,
        } => {
            // Per the standard (and pymodbus): the write half applies before
            // the read half, so a read that overlaps the write observes it.
            device.write_holding_registers(*write_address, write_values)?;
            let values = device.read_holding_registers(*read_address, *read_quantity)?;
            Ok(Response::ReadWriteMultipleRegisters(values))
        }
        Request::ReadFifoQueue { address } => {
            Ok(Response::ReadFifoQueue(device.read_fifo_queue(*address)?))
        }
        Request::ReadDeviceIdentification {
            read_device_id_code,
            object_id,
        } => read_device_identification(identification, *read_device_id_code, *object_id),
    }
}

fn read_device_identification(
    identification: &ModbusDeviceIdentification,
    read_device_id_code: u8,
    object_id: u8,
) -> Result<Response, ExceptionCode> {
    let all_objects = identification.objects();
    match read_device_id_code {
        // Basic (vendor name, product code, revision).
        0x01 => Ok(device_id_response(&all_objects[..3.min(all_objects.len())], object_id)),
        // Regular and extended both resolve to the full object set here —
        // this implementer carries no extended (vendor-specific) objects.
        0x02 | 0x03 => Ok(device_id_response(&all_objects, object_id)),
        // Individual object access: exactly one object, by id.
        0x04 => {
            let value = all_objects
                .iter()
                .find(|(id, _)| *id == object_id)
                .map(|(_, v)| v.clone())
                .ok_or(ExceptionCode::IllegalDataValue)?;
            Ok(Response::ReadDeviceIdentification {
                more_follows: false,
                next_object_id: 0,
                objects: vec![(object_id, value)],
            })
        }
        _ => Err(ExceptionCode::IllegalDataValue),
    }
}

fn device_id_response(objects: &[(u8, Vec<u8>)], start_at: u8) -> Response {
    let objects: Vec<(u8, Vec<u8>)> = objects
        .iter()
        .filter(|(id, _)| *id >= start_at)
        .cloned()
        .collect();
    Response::ReadDeviceIdentification {
        more_follows: false,
        next_object_id: 0,
        objects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::block::{Block, SequentialBlock, SparseBlock, SparseInit};

    fn device_with(hr: Vec<u16>) -> DeviceContext {
        DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, hr)),
            Box::new(SequentialBlock::new(0, vec![0u16; 16])),
        )
    }

    #[test]
    fn read_holding_registers_matches_literal_scenario() {
        // Scenario 1: hr = [17, 17, ...]; FC3 addr 0 qty 1 -> [17].
        let mut device = device_with(vec![17; 16]);
        let reply = update_datastore(
            &mut device,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        assert_eq!(reply, PduReply::Ok(Response::ReadHoldingRegisters(vec![17])));
    }

    #[test]
    fn illegal_address_maps_to_exception_reply() {
        // Scenario 2: sequential hr base 0 len 100, FC3 addr 200 qty 1.
        let mut device = device_with(vec![0; 100]);
        let reply = update_datastore(
            &mut device,
            &Request::ReadHoldingRegisters {
                address: 200,
                quantity: 1,
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        assert_eq!(
            reply,
            PduReply::Exception(ExceptionResponse::new(
                super::super::codes::FunctionCode::ReadHoldingRegisters,
                ExceptionCode::IllegalDataAddress
            ))
        );
    }

    #[test]
    fn write_multiple_coils_then_read_back_matches_literal_scenario() {
        // Scenario 3: FC15 addr 1 qty 21 all true, read back 24 bits.
        let mut device = DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, vec![false; 32])),
            Box::new(SequentialBlock::new(0, vec![0u16; 16])),
            Box::new(SequentialBlock::new(0, vec![0u16; 16])),
        );
        let write_reply = update_datastore(
            &mut device,
            &Request::WriteMultipleCoils {
                address: 1,
                values: vec![true; 21],
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        assert_eq!(
            write_reply,
            PduReply::Ok(Response::WriteMultipleCoils {
                address: 1,
                quantity: 21
            })
        );
        let read_reply = update_datastore(
            &mut device,
            &Request::ReadCoils {
                address: 1,
                quantity: 24,
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        let mut expected = vec![true; 21];
        expected.extend(vec![false; 3]);
        assert_eq!(read_reply, PduReply::Ok(Response::ReadCoils(expected)));
    }

    #[test]
    fn read_write_multiple_registers_writes_before_reading() {
        let mut device = device_with(vec![0; 16]);
        let reply = update_datastore(
            &mut device,
            &Request::ReadWriteMultipleRegisters {
                read_address: 0,
                read_quantity: 2,
                write_address: 0,
                write_values: vec![9, 9],
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        assert_eq!(
            reply,
            PduReply::Ok(Response::ReadWriteMultipleRegisters(vec![9, 9]))
        );
    }

    #[test]
    fn sparse_fixed_write_from_wire_is_illegal_address_not_panic() {
        let mut device = DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SparseBlock::with_mutability(
                SparseInit::Map(std::collections::BTreeMap::from([(0u16, 1u16)])),
                crate::datastore::block::SparseMutability::Fixed,
            )),
            Box::new(SequentialBlock::new(0, vec![0u16; 16])),
        );
        let reply = update_datastore(
            &mut device,
            &Request::WriteSingleRegister {
                address: 5,
                value: 1,
            },
            &Limits::default(),
            &ModbusDeviceIdentification::default(),
        );
        assert_eq!(
            reply,
            PduReply::Exception(ExceptionResponse::new(
                super::super::codes::FunctionCode::WriteSingleRegister,
                ExceptionCode::IllegalDataAddress
            ))
        );
    }
}
