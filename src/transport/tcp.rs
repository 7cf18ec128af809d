//! Plain TCP stream transport.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{CloseHook, StreamTransport};

pub struct TcpTransport {
    stream: TcpStream,
    read_buf: [u8; 4096],
    close_hook: CloseHook,
    closed: bool,
}

impl TcpTransport {
    pub async fn connect<A: ToSocketAddrs>(addr: A, timeout_connect: Duration) -> Result<Self> {
        let stream = timeout(timeout_connect, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("TCP connect timed out"))?
            .map_err(|e| Error::connection(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::connection(e.to_string()))?;
        debug!("TCP transport connected to {:?}", stream.peer_addr());
        Ok(Self {
            stream,
            read_buf: [0u8; 4096],
            close_hook: CloseHook::default(),
            closed: false,
        })
    }

    /// Connects like [`Self::connect`], but binds the local socket to
    /// `source` first (§6's `source_address` client option) instead of
    /// letting the OS pick an ephemeral port.
    pub async fn connect_from(
        addr: SocketAddr,
        source: SocketAddr,
        timeout_connect: Duration,
    ) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| Error::connection(e.to_string()))?;
        socket
            .bind(source)
            .map_err(|e| Error::connection(e.to_string()))?;
        let stream = timeout(timeout_connect, socket.connect(addr))
            .await
            .map_err(|_| Error::timeout("TCP connect timed out"))?
            .map_err(|e| Error::connection(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::connection(e.to_string()))?;
        debug!("TCP transport connected to {addr} from {source}");
        Ok(Self {
            stream,
            read_buf: [0u8; 4096],
            close_hook: CloseHook::default(),
            closed: false,
        })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: [0u8; 4096],
            close_hook: CloseHook::default(),
            closed: false,
        }
    }
}

#[async_trait]
impl StreamTransport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| Error::io(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let n = self
            .stream
            .read(&mut self.read_buf)
            .await
            .map_err(|e| Error::io(e.to_string()))?;
        if n == 0 {
            warn!("TCP transport peer closed the connection");
            self.close_hook.fire();
            return Err(Error::connection("peer closed the connection"));
        }
        Ok(self.read_buf[..n].to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.stream.shutdown().await.map_err(|e| Error::io(e.to_string()));
        self.close_hook.fire();
        result
    }

    fn on_close(&mut self, callback: Box<dyn FnOnce() + Send>) {
        self.close_hook.set(callback);
    }
}
