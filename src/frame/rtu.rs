//! RTU framing (serial): `device_id:u8 | pdu | crc:u16` (CRC low byte
//! first). The wire carries no frame-length field, so the framer must
//! infer the PDU length from the function code — fixed for most request
//! shapes, derived from a `byte_count` byte for the variable ones — and
//! the caller tells it which direction (request vs. reply) it is framing,
//! since the same function code has a different payload shape each way.

use super::{DecodedFrame, FrameEvent, Framer};

/// CRC-16/MODBUS: polynomial 0xA001 (reflected 0x8005), initial 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Which side of the exchange this framer decodes: a server decodes
/// requests, a client decodes replies. Each direction reads a different
/// payload shape off the same function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtuRole {
    Server,
    Client,
}

#[derive(Debug)]
pub struct RtuFramer {
    role: RtuRole,
    buffer: Vec<u8>,
}

impl RtuFramer {
    pub fn new(role: RtuRole) -> Self {
        Self {
            role,
            buffer: Vec::new(),
        }
    }
}

enum PduLen {
    Known(usize),
    Incomplete,
    Invalid,
}

/// Length of a request PDU (function code included), inferred from the
/// function code and, for the byte-count-prefixed shapes, a peek at the
/// count byte once it has arrived.
fn request_pdu_len(pdu: &[u8]) -> PduLen {
    if pdu.is_empty() {
        return PduLen::Incomplete;
    }
    match pdu[0] {
        0x01 | 0x02 | 0x03 | 0x04 | 0x05 | 0x06 => len_if(pdu, 5),
        0x07 | 0x0B | 0x0C | 0x11 => PduLen::Known(1),
        0x08 => len_if(pdu, 5), // sub-function(2) + one data word(2), fc(1)
        0x0F | 0x10 => byte_count_prefixed(pdu, 5),
        0x14 | 0x15 => byte_count_prefixed(pdu, 1),
        0x16 => len_if(pdu, 7),
        0x17 => byte_count_prefixed(pdu, 9),
        0x18 => len_if(pdu, 3),
        0x2B => len_if(pdu, 4),
        _ => PduLen::Invalid,
    }
}

/// Length of a reply PDU (function code included, exception bit already
/// observed by the caller). Non-exception replies mirror the request
/// table with each function code's own response shape.
fn response_pdu_len(pdu: &[u8]) -> PduLen {
    if pdu.is_empty() {
        return PduLen::Incomplete;
    }
    let fc = pdu[0];
    if fc & 0x80 != 0 {
        return PduLen::Known(2);
    }
    match fc {
        0x01 | 0x02 | 0x03 | 0x04 => byte_count_prefixed(pdu, 2),
        0x05 | 0x06 => len_if(pdu, 5),
        0x07 => len_if(pdu, 2),
        0x08 => len_if(pdu, 5),
        0x0B => len_if(pdu, 5),
        0x0C | 0x11 | 0x14 | 0x15 | 0x17 => byte_count_prefixed(pdu, 2),
        0x0F | 0x10 => len_if(pdu, 5),
        0x16 => len_if(pdu, 7),
        0x18 => fifo_len(pdu),
        0x2B => device_id_len(pdu),
        _ => PduLen::Invalid,
    }
}

fn len_if(pdu: &[u8], needed: usize) -> PduLen {
    if pdu.len() >= needed {
        PduLen::Known(needed)
    } else {
        PduLen::Incomplete
    }
}

/// Shapes of the form `fc | byte_count:u8 | byte_count bytes...`, where
/// `byte_count` sits at `pdu[count_offset - 1]`.
fn byte_count_prefixed(pdu: &[u8], count_offset: usize) -> PduLen {
    if pdu.len() < count_offset {
        return PduLen::Incomplete;
    }
    let byte_count = pdu[count_offset - 1] as usize;
    len_if(pdu, count_offset + byte_count)
}

/// FC 0x18 read FIFO queue response: `fc | byte_count:u16 | count:u16 |
/// count x u16`.
fn fifo_len(pdu: &[u8]) -> PduLen {
    if pdu.len() < 5 {
        return PduLen::Incomplete;
    }
    let count = u16::from_be_bytes([pdu[3], pdu[4]]) as usize;
    len_if(pdu, 5 + count * 2)
}

/// FC 0x2B (MEI 14) device identification response: fixed 6-byte header
/// then `object_count` objects, each `id:u8 | len:u8 | len bytes`.
fn device_id_len(pdu: &[u8]) -> PduLen {
    if pdu.len() < 6 {
        return PduLen::Incomplete;
    }
    let object_count = pdu[5] as usize;
    let mut offset = 6;
    for _ in 0..object_count {
        if pdu.len() < offset + 2 {
            return PduLen::Incomplete;
        }
        let len = pdu[offset + 1] as usize;
        offset += 2 + len;
        if pdu.len() < offset {
            return PduLen::Incomplete;
        }
    }
    PduLen::Known(offset)
}

impl RtuFramer {
    fn pdu_len(&self, pdu: &[u8]) -> PduLen {
        match self.role {
            RtuRole::Server => request_pdu_len(pdu),
            RtuRole::Client => response_pdu_len(pdu),
        }
    }
}

impl Framer for RtuFramer {
    fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        loop {
            if self.buffer.len() < 2 {
                break;
            }
            let device_id = self.buffer[0];
            match self.pdu_len(&self.buffer[1..]) {
                PduLen::Known(pdu_len) => {
                    let total_len = 1 + pdu_len + 2;
                    if self.buffer.len() < total_len {
                        break;
                    }
                    let pdu = self.buffer[1..1 + pdu_len].to_vec();
                    let expected_crc = crc16(&self.buffer[..1 + pdu_len]);
                    let actual_crc =
                        u16::from_le_bytes([self.buffer[1 + pdu_len], self.buffer[2 + pdu_len]]);
                    if expected_crc != actual_crc {
                        events.push(FrameEvent::Invalid {
                            reason: format!(
                                "CRC mismatch: expected 0x{expected_crc:04X}, got 0x{actual_crc:04X}"
                            ),
                        });
                        self.buffer.remove(0);
                        continue;
                    }
                    self.buffer.drain(..total_len);
                    events.push(FrameEvent::Frame(DecodedFrame {
                        transaction_id: None,
                        device_id,
                        pdu,
                    }));
                }
                PduLen::Incomplete => break,
                PduLen::Invalid => {
                    events.push(FrameEvent::Invalid {
                        reason: format!("unrecognized function code 0x{:02X}", self.buffer[1]),
                    });
                    self.buffer.remove(0);
                }
            }
        }
        events
    }

    fn build(&self, device_id: u8, pdu: &[u8], _transaction_id: Option<u16>) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + pdu.len() + 2);
        out.push(device_id);
        out.extend_from_slice(pdu);
        let crc = crc16(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_vector() {
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x01, 0x00, 0x02]), 0x95C4);
    }

    #[test]
    fn flipping_one_bit_is_rejected() {
        let framer_build = RtuFramer::new(RtuRole::Server);
        let mut bytes = framer_build.build(1, &[0x03, 0x00, 0x01, 0x00, 0x02], None);
        bytes[2] ^= 0x01;
        let mut framer = RtuFramer::new(RtuRole::Server);
        let events = framer.feed(&bytes);
        assert!(events.iter().any(|e| matches!(e, FrameEvent::Invalid { .. })));
    }

    #[test]
    fn round_trips_a_request_frame() {
        let builder = RtuFramer::new(RtuRole::Server);
        let bytes = builder.build(1, &[0x03, 0x00, 0x01, 0x00, 0x02], None);
        let mut reader = RtuFramer::new(RtuRole::Server);
        let events = reader.feed(&bytes);
        assert_eq!(
            events,
            vec![FrameEvent::Frame(DecodedFrame {
                transaction_id: None,
                device_id: 1,
                pdu: vec![0x03, 0x00, 0x01, 0x00, 0x02],
            })]
        );
    }

    #[test]
    fn resyncs_past_leading_garbage() {
        // Scenario 4: feed FF FF FF <valid RTU frame>, expect exactly one
        // frame and nothing else surviving the garbage.
        let builder = RtuFramer::new(RtuRole::Server);
        let valid = builder.build(1, &[0x03, 0x00, 0x01, 0x00, 0x02], None);
        let mut garbage = vec![0xFF, 0xFF, 0xFF];
        garbage.extend_from_slice(&valid);

        let mut reader = RtuFramer::new(RtuRole::Server);
        let events = reader.feed(&garbage);
        let frames: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, FrameEvent::Frame(_)))
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            &FrameEvent::Frame(DecodedFrame {
                transaction_id: None,
                device_id: 1,
                pdu: vec![0x03, 0x00, 0x01, 0x00, 0x02],
            })
        );
    }

    #[test]
    fn write_multiple_registers_request_length_from_byte_count() {
        let pdu = [0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02];
        assert!(matches!(request_pdu_len(&pdu), PduLen::Known(10)));
    }

    #[test]
    fn exception_reply_is_fixed_two_bytes() {
        assert!(matches!(response_pdu_len(&[0x83, 0x02]), PduLen::Known(2)));
    }
}
