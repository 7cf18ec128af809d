//! Serial port transport (RTU/ASCII), backed by `tokio-serial`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use crate::error::{Error, Result};

use super::{CloseHook, StreamTransport};

/// Serial line parameters; defaults match the standard Modbus RTU
/// presentation (8 data bits, no parity, 1 stop bit).
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(1),
        }
    }
}

pub struct SerialTransport {
    port: SerialStream,
    read_buf: [u8; 512],
    close_hook: CloseHook,
    closed: bool,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = tokio_serial::new(&config.path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| Error::connection(e.to_string()))?;
        debug!("opened serial port {} at {} baud", config.path, config.baud_rate);
        Ok(Self {
            port,
            read_buf: [0u8; 512],
            close_hook: CloseHook::default(),
            closed: false,
        })
    }
}

#[async_trait]
impl StreamTransport for SerialTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .await
            .map_err(|e| Error::io(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let n = self
            .port
            .read(&mut self.read_buf)
            .await
            .map_err(|e| Error::io(e.to_string()))?;
        if n == 0 {
            self.close_hook.fire();
            return Err(Error::connection("serial port returned EOF"));
        }
        Ok(self.read_buf[..n].to_vec())
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
