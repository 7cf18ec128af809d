//! MBAP framing (TCP/TLS): `transaction_id:u16 | protocol_id:u16=0 |
//! length:u16 | unit_id:u8` followed by the PDU. `length` counts every
//! byte after the length field itself, so a frame is complete once
//! `6 + length` bytes are buffered.

use super::{DecodedFrame, FrameEvent, Framer};

const HEADER_LEN: usize = 7;
/// Largest legal MBAP `length` field: one unit-id byte plus the largest
/// possible PDU (253 bytes, the standard Modbus PDU cap).
const MAX_LENGTH: u16 = 254;

#[derive(Debug, Default)]
pub struct MbapFramer {
    buffer: Vec<u8>,
}

impl MbapFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Attempts to decode exactly one MBAP frame from the front of `data`,
/// with no buffering concerns — used both by the streaming [`MbapFramer`]
/// and the datagram-oriented socket framer.
fn try_decode_one(data: &[u8]) -> DecodeOutcome {
    if data.len() < HEADER_LEN {
        return DecodeOutcome::Incomplete;
    }
    let transaction_id = u16::from_be_bytes([data[0], data[1]]);
    let protocol_id = u16::from_be_bytes([data[2], data[3]]);
    let length = u16::from_be_bytes([data[4], data[5]]);
    if protocol_id != 0 {
        return DecodeOutcome::Invalid(format!("non-zero protocol id {protocol_id}"));
    }
    if length == 0 || length > MAX_LENGTH {
        return DecodeOutcome::Invalid(format!("implausible MBAP length {length}"));
    }
    let total_len = 6 + length as usize;
    if data.len() < total_len {
        return DecodeOutcome::Incomplete;
    }
    let device_id = data[6];
    let pdu = data[7..total_len].to_vec();
    DecodeOutcome::Frame {
        consumed: total_len,
        frame: DecodedFrame {
            transaction_id: Some(transaction_id),
            device_id,
            pdu,
        },
    }
}

enum DecodeOutcome {
    Frame { consumed: usize, frame: DecodedFrame },
    Incomplete,
    Invalid(String),
}

/// Decodes exactly one datagram's worth of MBAP framing, for the socket
/// (UDP) variant. Returns `None` on anything short of a full, valid frame
/// — a partial datagram is dropped, not buffered.
pub(super) fn decode_one(datagram: &[u8]) -> Option<DecodedFrame> {
    match try_decode_one(datagram) {
        DecodeOutcome::Frame { frame, .. } => Some(frame),
        DecodeOutcome::Incomplete | DecodeOutcome::Invalid(_) => None,
    }
}

impl Framer for MbapFramer {
    fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        loop {
            match try_decode_one(&self.buffer) {
                DecodeOutcome::Frame { consumed, frame } => {
                    self.buffer.drain(..consumed);
                    events.push(FrameEvent::Frame(frame));
                }
                DecodeOutcome::Incomplete => break,
                DecodeOutcome::Invalid(reason) => {
                    // Nothing in the stream tells us where the next frame
                    // starts once the header is untrustworthy; resync one
                    // byte at a time, same policy as RTU.
                    self.buffer.remove(0);
                    events.push(FrameEvent::Invalid { reason });
                }
            }
        }
        events
    }

    fn build(&self, device_id: u8, pdu: &[u8], transaction_id: Option<u16>) -> Vec<u8> {
        let transaction_id = transaction_id.unwrap_or(0);
        let length = (pdu.len() + 1) as u16;
        let mut out = Vec::with_capacity(HEADER_LEN + pdu.len());
        out.extend_from_slice(&transaction_id.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.push(device_id);
        out.extend_from_slice(pdu);
        out
    }
}
