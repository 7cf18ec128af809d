//! Byte framing for the three standard Modbus transports plus the UDP
//! socket variant, which reuses the MBAP layout byte-for-byte.
//!
//! A framer owns no I/O (§4.E): it only turns a byte stream into frames and
//! back. `feed` is fed whatever bytes a transport happened to deliver and
//! returns every frame now fully buffered, in arrival order; bytes that
//! don't yet form a complete frame stay buffered for the next call.

mod ascii;
mod mbap;
mod rtu;

pub use ascii::AsciiFramer;
pub use mbap::MbapFramer;
pub use rtu::{RtuFramer, RtuRole};

/// One fully decoded frame: the device id it addressed, its raw PDU bytes,
/// and (MBAP/socket only) the transaction id that correlates it to a
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub transaction_id: Option<u16>,
    pub device_id: u8,
    pub pdu: Vec<u8>,
}

/// What `Framer::feed` produces for one chunk of the byte stream: a
/// complete frame, or notice that the framer discarded bytes it couldn't
/// make sense of (CRC/LRC mismatch, unknown function code, bad protocol
/// id) while resynchronizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Frame(DecodedFrame),
    Invalid { reason: String },
}

/// Shared framer interface. Implementations are not `Send`-bound here
/// because they hold no I/O; the transaction manager boxes them as
/// `Box<dyn Framer + Send>` since it moves them into a spawned task.
pub trait Framer {
    /// Feed newly arrived bytes into the framer's internal buffer, and
    /// drain every frame (or resync notice) now available.
    fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent>;

    /// Build the wire bytes for one outbound frame. `transaction_id` is
    /// only meaningful for MBAP/socket framing; other framers ignore it.
    fn build(&self, device_id: u8, pdu: &[u8], transaction_id: Option<u16>) -> Vec<u8>;
}

/// The UDP "socket" framing variant: identical byte layout to MBAP, with
/// the rule that each datagram carries exactly one frame and a partial
/// datagram is dropped rather than buffered across packets (§4.E).
#[derive(Debug, Default)]
pub struct SocketFramer {
    inner: MbapFramer,
}

impl SocketFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes exactly one datagram. A partial or malformed datagram is
    /// dropped (returns `None`), never buffered for the next one.
    pub fn decode_datagram(&self, datagram: &[u8]) -> Option<DecodedFrame> {
        mbap::decode_one(datagram)
    }

    pub fn build(&self, device_id: u8, pdu: &[u8], transaction_id: Option<u16>) -> Vec<u8> {
        self.inner.build(device_id, pdu, transaction_id)
    }
}
