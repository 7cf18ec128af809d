//! Transport seam (§6): the byte-I/O boundary the transaction manager and
//! server pipeline drive. A transport owns no framing and no PDU knowledge
//! — it only moves bytes (or datagrams) and reports when the peer goes
//! away, the way `comsrv`'s `Transport` trait separates I/O from protocol.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

mod tcp;
#[cfg(feature = "rtu")]
mod serial;
#[cfg(feature = "tls")]
mod tls;
mod udp;

pub use tcp::TcpTransport;
#[cfg(feature = "rtu")]
pub use serial::{SerialConfig, SerialTransport};
#[cfg(feature = "tls")]
pub use tls::TlsTransport;
pub use udp::UdpTransport;

/// A connection-oriented byte transport: TCP, TLS, or a serial port. The
/// framer's buffer sits directly on top of this.
#[async_trait]
pub trait StreamTransport: Send {
    /// Write `bytes` to the peer.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever bytes are currently available (at least one byte),
    /// blocking until some arrive or the connection closes.
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> Result<()>;

    /// Register a callback invoked exactly once, the first time the
    /// transport observes its connection has closed (peer hangup or a
    /// local `close()` call).
    fn on_close(&mut self, callback: Box<dyn FnOnce() + Send>);
}

/// A datagram transport (UDP): send/receive carry the peer address
/// alongside the bytes, since there's no persistent connection to imply it.
#[async_trait]
pub trait DatagramTransport: Send {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<()>;
    async fn receive_from(&mut self) -> Result<(Vec<u8>, SocketAddr)>;
    async fn close(&mut self) -> Result<()>;
    fn on_close(&mut self, callback: Box<dyn FnOnce() + Send>);
}

/// Shared bookkeeping for the one-shot close callback, used by every
/// concrete transport below instead of duplicating the `Option<Box<dyn
/// FnOnce()>>` dance in each one.
#[derive(Default)]
pub(crate) struct CloseHook {
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl CloseHook {
    pub(crate) fn set(&mut self, callback: Box<dyn FnOnce() + Send>) {
        self.callback = Some(callback);
    }

    pub(crate) fn fire(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}
