//! The six literal end-to-end scenarios of SPEC_FULL §8 (carried
//! unchanged from spec.md's own §8), each driven through the real
//! pipeline a production server/client would use — no mocked framing or
//! dispatch.

use std::sync::Arc;
use std::time::Duration;

use modbus_stack::datastore::block::{Block, SequentialBlock};
use modbus_stack::datastore::{DeviceContext, ServerContext};
use modbus_stack::error::Error;
use modbus_stack::frame::{DecodedFrame, Framer, MbapFramer};
use modbus_stack::pdu::{decode_reply, ExceptionCode, FunctionCode, PduReply, Response};
use modbus_stack::server::{handle_frame, ServerConfig};
use modbus_stack::transaction::{Concurrency, ManagerConfig, OutboundRequest, TransactionManager};
use modbus_stack::transport::StreamTransport;

fn hex_bytes(hex: &str) -> Vec<u8> {
    hex.split_whitespace()
        .map(|pair| u8::from_str_radix(pair, 16).unwrap())
        .collect()
}

fn device_with_registers(values: Vec<u16>) -> DeviceContext {
    DeviceContext::new(
        Box::new(SequentialBlock::new(0, vec![false; 16])),
        Box::new(SequentialBlock::new(0, vec![false; 16])),
        Box::new(SequentialBlock::new(0, values)),
        Box::new(SequentialBlock::new(0, vec![0u16; 16])),
    )
}

fn decode_one_frame(bytes: &[u8]) -> DecodedFrame {
    let mut framer = MbapFramer::new();
    let events = framer.feed(bytes);
    assert_eq!(events.len(), 1, "expected exactly one decoded frame");
    match events.into_iter().next().unwrap() {
        modbus_stack::frame::FrameEvent::Frame(frame) => frame,
        other => panic!("expected a complete frame, got {other:?}"),
    }
}

/// Scenario 1: read holding registers.
#[test]
fn scenario_read_holding_registers() {
    let mut context = ServerContext::Single(device_with_registers(vec![17; 16]));
    let config = ServerConfig::default();

    let request = hex_bytes("01 00 00 00 00 06 01 03 00 00 00 01");
    let frame = decode_one_frame(&request);
    assert_eq!(frame.device_id, 1);
    assert_eq!(frame.transaction_id, Some(0x0100));

    let reply_pdu = handle_frame(&frame, &mut context, &config).expect("a reply is owed");
    let framer = MbapFramer::new();
    let reply_bytes = framer.build(frame.device_id, &reply_pdu, frame.transaction_id);

    assert_eq!(reply_bytes, hex_bytes("01 00 00 00 00 05 01 03 02 00 11"));
}

/// Scenario 2: illegal address.
#[test]
fn scenario_illegal_address() {
    let mut context = ServerContext::Single(device_with_registers(vec![0; 100]));
    let config = ServerConfig::default();

    let request = hex_bytes("00 01 00 00 00 06 01 03 00 C8 00 01"); // addr 200, qty 1
    let frame = decode_one_frame(&request);

    let reply_pdu = handle_frame(&frame, &mut context, &config).expect("a reply is owed");
    assert_eq!(reply_pdu[0], 0x83);
    assert_eq!(reply_pdu[1], 0x02);

    match decode_reply(&reply_pdu).unwrap() {
        PduReply::Exception(exc) => {
            assert_eq!(exc.function_code, FunctionCode::ReadHoldingRegisters);
            assert_eq!(exc.exception_code, ExceptionCode::IllegalDataAddress);
        }
        other => panic!("expected an exception reply, got {other:?}"),
    }
}

/// Scenario 3: write multiple coils, then read the range back.
#[test]
fn scenario_write_multiple_coils_then_read_back() {
    let device = DeviceContext::new(
        Box::new(SequentialBlock::new(0, vec![false; 32])),
        Box::new(SequentialBlock::new(0, vec![false; 32])),
        Box::new(SequentialBlock::new(0, vec![0u16; 16])),
        Box::new(SequentialBlock::new(0, vec![0u16; 16])),
    );
    let mut context = ServerContext::Single(device);
    let config = ServerConfig::default();
    let framer = MbapFramer::new();

    // FC15: write 21 coils, starting at address 1, all true.
    let write_pdu = modbus_stack::pdu::encode_request(&modbus_stack::pdu::Request::WriteMultipleCoils {
        address: 1,
        values: vec![true; 21],
    });
    let write_bytes = framer.build(1, &write_pdu, Some(1));
    let write_frame = decode_one_frame(&write_bytes);
    let write_reply = handle_frame(&write_frame, &mut context, &config).expect("write is acked");
    assert_eq!(
        decode_reply(&write_reply).unwrap(),
        PduReply::Ok(Response::WriteMultipleCoils {
            address: 1,
            quantity: 21
        })
    );

    // FC1: read the same 21 coils back.
    let read_pdu = modbus_stack::pdu::encode_request(&modbus_stack::pdu::Request::ReadCoils {
        address: 1,
        quantity: 21,
    });
    let read_bytes = framer.build(1, &read_pdu, Some(2));
    let read_frame = decode_one_frame(&read_bytes);
    let read_reply = handle_frame(&read_frame, &mut context, &config).expect("read is answered");

    let mut expected = vec![true; 21];
    expected.extend(vec![false; 3]);
    assert_eq!(
        decode_reply(&read_reply).unwrap(),
        PduReply::Ok(Response::ReadCoils(expected))
    );
}

/// A transport that never produces a reply, so every call times out.
struct SilentTransport {
    sends: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait::async_trait]
impl StreamTransport for SilentTransport {
    async fn send(&mut self, _bytes: &[u8]) -> modbus_stack::Result<()> {
        self.sends.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&mut self) -> modbus_stack::Result<Vec<u8>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> modbus_stack::Result<()> {
        Ok(())
    }

    fn on_close(&mut self, _callback: Box<dyn FnOnce() + Send>) {}
}

/// Scenario 5: with a transport that never replies, a request with a
/// short deadline fails with a timeout after `retries + 1` attempts.
#[tokio::test]
async fn scenario_timeout_after_retries_exhausted() {
    let sends = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let transport = SilentTransport {
        sends: sends.clone(),
    };
    let manager = TransactionManager::spawn(
        Box::new(transport),
        Box::new(MbapFramer::new()),
        ManagerConfig {
            concurrency: Concurrency::Concurrent,
            timeout_request: Duration::from_millis(50),
            retries: 2,
            ..ManagerConfig::default()
        },
    );

    let result = manager
        .call(OutboundRequest {
            device_id: 1,
            function_code: 0x03,
            pdu: vec![0x03, 0x00, 0x00, 0x00, 0x01],
        })
        .await;

    assert!(matches!(result, Err(Error::Timeout(_))));
    // One initial send plus two retries.
    assert_eq!(sends.load(std::sync::atomic::Ordering::SeqCst), 3);
}

/// Scenario 6: a broadcast write (`dev_id=0`) gets no wire reply and the
/// client call still resolves to success once the silent interval elapses.
#[tokio::test]
async fn scenario_broadcast_resolves_successfully_without_a_reply() {
    let transport = SilentTransport {
        sends: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    };
    let manager = TransactionManager::spawn(
        Box::new(transport),
        Box::new(MbapFramer::new()),
        ManagerConfig {
            broadcast_silent_interval: Duration::from_millis(20),
            ..ManagerConfig::default()
        },
    );

    let result = manager
        .call(OutboundRequest {
            device_id: 0,
            function_code: 0x06,
            pdu: vec![0x06, 0x00, 0x00, 0x00, 0x2A],
        })
        .await
        .expect("broadcast resolves to success");

    assert_eq!(result.device_id, 0);
    assert!(result.pdu.is_empty(), "broadcast carries no reply bytes");
}
