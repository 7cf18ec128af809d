//! TLS stream transport: MBAP framing carried over `tokio-rustls`, per
//! SPEC_FULL §4.E ("TLS is a transport concern, not a fourth wire format").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::debug;

use crate::error::{Error, Result};

use super::{CloseHook, StreamTransport};

pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
    read_buf: [u8; 4096],
    close_hook: CloseHook,
    closed: bool,
}

impl TlsTransport {
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        server_name: &str,
        tls_config: Arc<ClientConfig>,
        timeout_connect: Duration,
    ) -> Result<Self> {
        let tcp = timeout(timeout_connect, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("TLS connect timed out"))?
            .map_err(|e| Error::connection(e.to_string()))?;
        let connector = TlsConnector::from(tls_config);
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| Error::parameter(format!("invalid TLS server name: {e}")))?;
        let stream = connector
            .connect(name, tcp)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;
        debug!("TLS transport handshake complete with {server_name}");
        Ok(Self {
            stream,
            read_buf: [0u8; 4096],
            close_hook: CloseHook::default(),
            closed: false,
        })
    }
}

#[async_trait]
impl StreamTransport for TlsTransport {
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
            self.close_hook.fire();
            return Err(Error::connection("peer closed the TLS connection"));
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
