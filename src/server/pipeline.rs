//! Frame -> PDU -> dispatch -> response (§4.G), independent of any
//! transport or framing — a connection hands this one decoded frame and
//! gets back the response PDU bytes to frame and send, if any.

use tracing::debug;

use crate::datastore::ServerContext;
use crate::frame::DecodedFrame;
use crate::pdu::{
    decode_request, encode_reply, update_datastore, ExceptionCode, ExceptionResponse, PduReply,
};

use super::config::ServerConfig;

/// Runs one decoded frame through dispatch and returns the response PDU
/// bytes to send back, or `None` if no reply is owed (a dropped frame, a
/// silently ignored unknown device, or a broadcast).
pub fn handle_frame(
    frame: &DecodedFrame,
    context: &mut ServerContext,
    config: &ServerConfig,
) -> Option<Vec<u8>> {
    let request = match decode_request(&frame.pdu, &config.limits) {
        Ok(request) => request,
        Err(err) => {
            debug!("server: dropping unparsable PDU from device {}: {err}", frame.device_id);
            return None;
        }
    };

    if frame.device_id == 0 && config.broadcast_enable {
        context.for_each_device_mut(|device| {
            let _ = update_datastore(device, &request, &config.limits, &config.identification);
        });
        return None;
    }

    let Some(device) = context.device_mut(frame.device_id) else {
        if config.ignore_missing_devices {
            debug!("server: dropping request for unconfigured device {}", frame.device_id);
            return None;
        }
        let reply = PduReply::Exception(ExceptionResponse::new(
            request.function_code(),
            ExceptionCode::GatewayTargetDeviceFailedToRespond,
        ));
        return Some(encode_reply(&manipulate(config, reply)));
    };

    let reply = update_datastore(device, &request, &config.limits, &config.identification);
    Some(encode_reply(&manipulate(config, reply)))
}

fn manipulate(config: &ServerConfig, reply: PduReply) -> PduReply {
    match &config.response_manipulator {
        Some(manipulator) => manipulator(reply),
        None => reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::block::{Block, SequentialBlock};
    use crate::datastore::DeviceContext;
    use crate::pdu::{decode_reply, encode_request, Request, Response};
    use std::collections::HashMap;

    fn device_with_holding_registers(values: Vec<u16>) -> DeviceContext {
        DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, vec![false; 16])),
            Box::new(SequentialBlock::new(0, values)),
            Box::new(SequentialBlock::new(0, vec![0u16; 16])),
        )
    }

    fn frame_for(device_id: u8, request: &Request) -> DecodedFrame {
        DecodedFrame {
            transaction_id: Some(1),
            device_id,
            pdu: encode_request(request),
        }
    }

    #[test]
    fn known_device_gets_a_reply() {
        let mut context = ServerContext::Single(device_with_holding_registers(vec![17; 8]));
        let config = ServerConfig::default();
        let frame = frame_for(
            1,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
        );
        let reply = handle_frame(&frame, &mut context, &config).expect("reply expected");
        assert_eq!(
            decode_reply(&reply).unwrap(),
            PduReply::Ok(Response::ReadHoldingRegisters(vec![17]))
        );
    }

    #[test]
    fn unknown_device_gets_gateway_exception_by_default() {
        let mut map = HashMap::new();
        map.insert(1u8, device_with_holding_registers(vec![0; 8]));
        let mut context = ServerContext::Multi(map);
        let config = ServerConfig::default();
        let frame = frame_for(
            7,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
        );
        let reply = handle_frame(&frame, &mut context, &config).expect("reply expected");
        assert_eq!(
            decode_reply(&reply).unwrap(),
            PduReply::Exception(ExceptionResponse::new(
                crate::pdu::FunctionCode::ReadHoldingRegisters,
                ExceptionCode::GatewayTargetDeviceFailedToRespond,
            ))
        );
    }

    #[test]
    fn unknown_device_is_dropped_when_ignore_missing_devices_is_set() {
        let mut context = ServerContext::Multi(HashMap::new());
        let config = ServerConfig {
            ignore_missing_devices: true,
            ..ServerConfig::default()
        };
        let frame = frame_for(
            7,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
        );
        assert!(handle_frame(&frame, &mut context, &config).is_none());
    }

    #[test]
    fn broadcast_applies_to_every_device_and_gets_no_reply() {
        let mut map = HashMap::new();
        map.insert(1u8, device_with_holding_registers(vec![0; 8]));
        map.insert(2u8, device_with_holding_registers(vec![0; 8]));
        let mut context = ServerContext::Multi(map);
        let config = ServerConfig::default();
        let frame = frame_for(
            0,
            &Request::WriteSingleRegister {
                address: 0,
                value: 42,
            },
        );
        assert!(handle_frame(&frame, &mut context, &config).is_none());

        for id in [1u8, 2u8] {
            let reply = handle_frame(
                &frame_for(
                    id,
                    &Request::ReadHoldingRegisters {
                        address: 0,
                        quantity: 1,
                    },
                ),
                &mut context,
                &config,
            )
            .unwrap();
            assert_eq!(
                decode_reply(&reply).unwrap(),
                PduReply::Ok(Response::ReadHoldingRegisters(vec![42]))
            );
        }
    }

    #[test]
    fn disabling_broadcast_treats_device_zero_as_an_ordinary_address() {
        let mut context = ServerContext::Multi(HashMap::new());
        let config = ServerConfig {
            broadcast_enable: false,
            ..ServerConfig::default()
        };
        let frame = frame_for(
            0,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
        );
        // device id 0 isn't configured in Multi mode, so this now falls
        // through to the unknown-device path instead of broadcasting.
        let reply = handle_frame(&frame, &mut context, &config).expect("reply expected");
        assert_eq!(
            decode_reply(&reply).unwrap(),
            PduReply::Exception(ExceptionResponse::new(
                crate::pdu::FunctionCode::ReadHoldingRegisters,
                ExceptionCode::GatewayTargetDeviceFailedToRespond,
            ))
        );
    }

    #[test]
    fn response_manipulator_rewrites_the_reply() {
        let mut context = ServerContext::Single(device_with_holding_registers(vec![17; 8]));
        let config = ServerConfig {
            response_manipulator: Some(std::sync::Arc::new(|reply| match reply {
                PduReply::Ok(Response::ReadHoldingRegisters(_)) => {
                    PduReply::Ok(Response::ReadHoldingRegisters(vec![0xDEAD]))
                }
                other => other,
            })),
            ..ServerConfig::default()
        };
        let frame = frame_for(
            1,
            &Request::ReadHoldingRegisters {
                address: 0,
                quantity: 1,
            },
        );
        let reply = handle_frame(&frame, &mut context, &config).unwrap();
        assert_eq!(
            decode_reply(&reply).unwrap(),
            PduReply::Ok(Response::ReadHoldingRegisters(vec![0xDEAD]))
        );
    }

    #[test]
    fn unparsable_pdu_is_dropped_without_panicking() {
        let mut context = ServerContext::Single(device_with_holding_registers(vec![0; 8]));
        let config = ServerConfig::default();
        let frame = DecodedFrame {
            transaction_id: Some(1),
            device_id: 1,
            pdu: vec![0x99], // unsupported function code
        };
        assert!(handle_frame(&frame, &mut context, &config).is_none());
    }
}
