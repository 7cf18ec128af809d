use std::time::Duration;

/// A request the transaction manager is asked to carry: an already-encoded
/// PDU plus the addressing the framer needs. `function_code` excludes the
/// error bit — it's what a matching reply's function code must equal once
/// its own error bit is stripped.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub device_id: u8,
    pub function_code: u8,
    pub pdu: Vec<u8>,
}

impl OutboundRequest {
    pub fn is_broadcast(&self) -> bool {
        self.device_id == 0
    }
}

/// A reply the manager handed back to a waiter: the raw PDU bytes, ready
/// for [`crate::pdu::decode_reply`].
#[derive(Debug, Clone)]
pub struct InboundReply {
    pub device_id: u8,
    pub pdu: Vec<u8>,
}

/// Per-transport concurrency contract (§4.F): MBAP over TCP/TLS allows
/// multiple outstanding requests, matched by transaction id; RTU/ASCII
/// and UDP restrict the bus/destination to one in-flight request with
/// further requests queued FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Multiple requests may be outstanding; replies are matched by
    /// transaction id and may arrive out of order.
    Concurrent,
    /// Exactly one request in flight; further requests wait in a FIFO
    /// queue.
    Serialized,
}

/// Manager-wide configuration, mirroring the enumerated client options of
/// §6 that bear on transaction handling.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub concurrency: Concurrency,
    pub timeout_request: Duration,
    pub retries: u32,
    /// How long a broadcast "wait" lasts before the manager reports
    /// success, since a broadcast expects no reply to wait for.
    pub broadcast_silent_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Concurrent,
            timeout_request: Duration::from_secs(3),
            retries: 3,
            broadcast_silent_interval: Duration::from_millis(50),
        }
    }
}
