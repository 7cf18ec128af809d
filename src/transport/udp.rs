//! UDP datagram transport for the socket (MBAP-over-UDP) framing variant.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::error::{Error, Result};

use super::{CloseHook, DatagramTransport};

pub struct UdpTransport {
    socket: UdpSocket,
    read_buf: [u8; 4096],
    close_hook: CloseHook,
    closed: bool,
}

impl UdpTransport {
    pub async fn bind<A: ToSocketAddrs>(local_addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;
        Ok(Self {
            socket,
            read_buf: [0u8; 4096],
            close_hook: CloseHook::default(),
            closed: false,
        })
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket
            .send_to(bytes, peer)
            .await
            .map(|_| ())
            .map_err(|e| Error::io(e.to_string()))
    }

    async fn receive_from(&mut self) -> Result<(Vec<u8>, SocketAddr)> {
        let (n, peer) = self
            .socket
            .recv_from(&mut self.read_buf)
            .await
            .map_err(|e| Error::io(e.to_string()))?;
        Ok((self.read_buf[..n].to_vec(), peer))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_hook.fire();
        Ok(())
    }

    fn on_close(&mut self, callback: Box<dyn FnOnce() + Send>) {
        self.close_hook.set(callback);
    }
}
