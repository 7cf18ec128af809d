//! ASCII framing (serial): `:` | ASCII-hex(device_id) | ASCII-hex(pdu) |
//! ASCII-hex(LRC) | CR LF. LRC is the two's-complement of the 8-bit sum of
//! the decoded bytes (device id + PDU).

use super::{DecodedFrame, FrameEvent, Framer};

const START: u8 = b':';
const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

#[derive(Debug, Default)]
pub struct AsciiFramer {
    buffer: Vec<u8>,
}

impl AsciiFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Two's complement of the 8-bit sum of `data`.
pub fn lrc(data: &[u8]) -> u8 {
    let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

fn hex_encode_upper(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for b in data {
        s.push_str(&format!("{b:02X}"));
    }
    s
}

impl Framer for AsciiFramer {
    fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == START) else {
                // No frame start in the buffer at all: nothing useful to
                // resync toward. Keep only enough trailing bytes that a
                // `:` split across reads could still be recognized.
                self.buffer.clear();
                break;
            };
            if start > 0 {
                self.buffer.drain(..start);
                events.push(FrameEvent::Invalid {
                    reason: format!("discarded {start} byte(s) before frame start"),
                });
                continue;
            }
            let Some(lf_pos) = self.buffer.iter().position(|&b| b == LF) else {
                break; // terminator not in yet, wait for more bytes
            };
            if lf_pos == 0 || self.buffer[lf_pos - 1] != CR {
                events.push(FrameEvent::Invalid {
                    reason: "LF without preceding CR".to_string(),
                });
                self.buffer.drain(..=lf_pos);
                continue;
            }
            let hex_str = &self.buffer[1..lf_pos - 1];
            match decode_hex_frame(hex_str) {
                Ok(frame) => {
                    self.buffer.drain(..=lf_pos);
                    events.push(FrameEvent::Frame(frame));
                }
                Err(reason) => {
                    events.push(FrameEvent::Invalid { reason });
                    self.buffer.drain(..=lf_pos);
                }
            }
        }
        events
    }

    fn build(&self, device_id: u8, pdu: &[u8], _transaction_id: Option<u16>) -> Vec<u8> {
        let mut payload = vec![device_id];
        payload.extend_from_slice(pdu);
        let checksum = lrc(&payload);

        let mut out = vec![START];
        out.extend_from_slice(hex_encode_upper(&payload).as_bytes());
        out.extend_from_slice(hex_encode_upper(&[checksum]).as_bytes());
        out.push(CR);
        out.push(LF);
        out
    }
}

fn decode_hex_frame(hex_str: &[u8]) -> Result<DecodedFrame, String> {
    if hex_str.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    if hex_str.len() < 6 {
        return Err("frame shorter than device id + fc + lrc".to_string());
    }
    let decoded = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
    let (body, lrc_byte) = decoded.split_at(decoded.len() - 1);
    let expected_lrc = lrc(body);
    if expected_lrc != lrc_byte[0] {
        return Err(format!(
            "LRC mismatch: expected 0x{expected_lrc:02X}, got 0x{:02X}",
            lrc_byte[0]
        ));
    }
    let device_id = body[0];
    let pdu = body[1..].to_vec();
    Ok(DecodedFrame {
        transaction_id: None,
        device_id,
        pdu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame() {
        let framer = AsciiFramer::new();
        let bytes = framer.build(1, &[0x03, 0x00, 0x00, 0x00, 0x01], None);
        let mut reader = AsciiFramer::new();
        let events = reader.feed(&bytes);
        assert_eq!(
            events,
            vec![FrameEvent::Frame(DecodedFrame {
                transaction_id: None,
                device_id: 1,
                pdu: vec![0x03, 0x00, 0x00, 0x00, 0x01],
            })]
        );
    }

    #[test]
    fn lrc_is_twos_complement_of_sum() {
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let checksum = lrc(&data);
        let total = data
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b))
            .wrapping_add(checksum);
        assert_eq!(total, 0);
    }

    #[test]
    fn lrc_mismatch_is_invalid() {
        let framer = AsciiFramer::new();
        let mut bytes = framer.build(1, &[0x03, 0x00, 0x00, 0x00, 0x01], None);
        // corrupt one hex digit of the LRC field (penultimate pair before CRLF)
        let lrc_digit_index = bytes.len() - 4;
        bytes[lrc_digit_index] = if bytes[lrc_digit_index] == b'0' { b'1' } else { b'0' };
        let mut reader = AsciiFramer::new();
        let events = reader.feed(&bytes);
        assert!(events.iter().any(|e| matches!(e, FrameEvent::Invalid { .. })));
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let framer = AsciiFramer::new();
        let valid = framer.build(1, &[0x03, 0x00, 0x00, 0x00, 0x01], None);
        let mut garbage = b"garbage before frame".to_vec();
        garbage.extend_from_slice(&valid);
        let mut reader = AsciiFramer::new();
        let events = reader.feed(&garbage);
        assert!(events.iter().any(|e| matches!(e, FrameEvent::Frame(_))));
    }
}
