//! The typed client façade (§4.H): builders that construct request PDUs,
//! hand them to the transaction manager, and return the decoded response.
//!
//! A call never raises for a protocol-level exception — the peer's
//! exception response comes back as an ordinary `Ok(PduReply::Exception)`
//! whose `is_error()` is true, the same way `comsrv`'s Modbus client
//! returns a typed reply object rather than throwing on a Modbus
//! exception. Only transport errors, framing errors, and parameter
//! validation raise [`Error`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::{AsciiFramer, Framer, MbapFramer, RtuFramer, RtuRole};
use crate::pdu::{
    decode_reply, encode_request, FileRecordReadRequest, FileRecordWriteRequest, PduReply,
    Request, Response,
};
use crate::transaction::{ManagerConfig, OutboundRequest, TransactionManager};
use crate::transport::{StreamTransport, TcpTransport};

#[cfg(feature = "rtu")]
use crate::transport::{SerialConfig, SerialTransport};
#[cfg(feature = "tls")]
use crate::transport::TlsTransport;

use super::config::ClientConfig;
use super::validate;

/// What one (re)connect attempt produces: a fresh transport plus the
/// framer that goes with it.
type DialResult = Result<(Box<dyn StreamTransport>, Box<dyn Framer + Send>)>;

/// A reconnectable dial function. Boxed and cloned behind an `Arc` so the
/// background reconnect loop can call it repeatedly without borrowing the
/// [`Client`] across an `await`.
pub type ConnectFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = DialResult> + Send>> + Send + Sync>;

struct State {
    manager: Option<TransactionManager>,
    reconnecting: bool,
}

/// A Modbus client: one logical connection (TCP/TLS/RTU/ASCII) with
/// automatic reconnect on transport loss (§4.F "Reconnection").
///
/// Cloning a [`Client`] shares the same connection state — every clone
/// observes the same reconnects and the same live [`TransactionManager`].
#[derive(Clone)]
pub struct Client {
    state: Arc<Mutex<State>>,
    connect: ConnectFn,
    config: ClientConfig,
}

impl Client {
    /// Establishes the first connection via `connect` and spawns the
    /// transaction manager over it. Subsequent losses are handled by the
    /// background reconnect loop, not by failing this call again.
    pub async fn connect(connect: ConnectFn, config: ClientConfig) -> Result<Self> {
        let (transport, framer) = connect().await?;
        let manager = TransactionManager::spawn(transport, framer, manager_config(&config));
        Ok(Self {
            state: Arc::new(Mutex::new(State {
                manager: Some(manager),
                reconnecting: false,
            })),
            connect,
            config,
        })
    }

    /// Connects over plain TCP with MBAP framing (the "socket" framer).
    pub async fn connect_tcp(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let timeout_connect = config.timeout_connect;
        let source_address = config.source_address;
        let connect: ConnectFn = Arc::new(move || {
            Box::pin(async move {
                let transport = match source_address {
                    Some(source) => TcpTransport::connect_from(addr, source, timeout_connect).await?,
                    None => TcpTransport::connect(addr, timeout_connect).await?,
                };
                Ok((
                    Box::new(transport) as Box<dyn StreamTransport>,
                    Box::new(MbapFramer::new()) as Box<dyn Framer + Send>,
                ))
            })
        });
        Self::connect(connect, config).await
    }

    /// Connects over TLS with MBAP framing, per SPEC_FULL §4.E (TLS
    /// carries MBAP unchanged; only the transport differs).
    #[cfg(feature = "tls")]
    pub async fn connect_tls(
        addr: SocketAddr,
        server_name: String,
        tls_config: Arc<tokio_rustls::rustls::ClientConfig>,
        config: ClientConfig,
    ) -> Result<Self> {
        let timeout_connect = config.timeout_connect;
        let connect: ConnectFn = Arc::new(move || {
            let server_name = server_name.clone();
            let tls_config = tls_config.clone();
            Box::pin(async move {
                let transport =
                    TlsTransport::connect(addr, &server_name, tls_config, timeout_connect).await?;
                Ok((
                    Box::new(transport) as Box<dyn StreamTransport>,
                    Box::new(MbapFramer::new()) as Box<dyn Framer + Send>,
                ))
            })
        });
        Self::connect(connect, config).await
    }

    /// Connects over a serial port using RTU framing.
    #[cfg(feature = "rtu")]
    pub async fn connect_rtu(serial: SerialConfig, config: ClientConfig) -> Result<Self> {
        let connect: ConnectFn = Arc::new(move || {
            let serial = serial.clone();
            Box::pin(async move {
                let transport = SerialTransport::open(&serial)?;
                Ok((
                    Box::new(transport) as Box<dyn StreamTransport>,
                    Box::new(RtuFramer::new(RtuRole::Client)) as Box<dyn Framer + Send>,
                ))
            })
        });
        Self::connect(connect, config).await
    }

    /// Connects over a serial port using ASCII framing.
    #[cfg(feature = "rtu")]
    pub async fn connect_ascii(serial: SerialConfig, config: ClientConfig) -> Result<Self> {
        let connect: ConnectFn = Arc::new(move || {
            let serial = serial.clone();
            Box::pin(async move {
                let transport = SerialTransport::open(&serial)?;
                Ok((
                    Box::new(transport) as Box<dyn StreamTransport>,
                    Box::new(AsciiFramer::new()) as Box<dyn Framer + Send>,
                ))
            })
        });
        Self::connect(connect, config).await
    }

    async fn manager(&self) -> Result<TransactionManager> {
        let state = self.state.lock().await;
        state
            .manager
            .clone()
            .ok_or_else(|| Error::connection("client is not connected"))
    }

    /// Drives one request through the transaction manager and decodes the
    /// reply, or synthesizes the broadcast "applied, no reply" outcome.
    async fn call(&self, request: Request, device_id: u8) -> Result<PduReply> {
        if device_id == 0 && !is_broadcastable(&request) {
            return Err(Error::parameter(
                "device id 0 (broadcast) is only valid for write requests",
            ));
        }
        let manager = self.manager().await?;
        let function_code = request.function_code().code();
        let pdu = encode_request(&request);
        let outbound = OutboundRequest {
            device_id,
            function_code,
            pdu,
        };
        match manager.call(outbound).await {
            Ok(inbound) if inbound.pdu.is_empty() => Ok(PduReply::Ok(broadcast_echo(&request))),
            Ok(inbound) => decode_reply(&inbound.pdu),
            Err(err @ Error::Connection(_)) => {
                self.spawn_reconnect();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Kicks off the background reconnect loop (§4.F "Reconnection") if
    /// one isn't already running. A no-op when `reconnect_delay_max` is
    /// zero, per §6 ("0 disables reconnect").
    fn spawn_reconnect(&self) {
        if self.config.reconnect_delay_max.is_zero() {
            warn!("client: connection lost and reconnect is disabled (reconnect_delay_max=0)");
            return;
        }
        let state = self.state.clone();
        let connect = self.connect.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            {
                let mut guard = state.lock().await;
                if guard.reconnecting {
                    return;
                }
                guard.reconnecting = true;
                guard.manager = None;
            }
            let mut delay = config.reconnect_delay;
            loop {
                let jittered = jitter(delay);
                tokio::time::sleep(jittered).await;
                match connect().await {
                    Ok((transport, framer)) => {
                        let manager =
                            TransactionManager::spawn(transport, framer, manager_config(&config));
                        let mut guard = state.lock().await;
                        guard.manager = Some(manager);
                        guard.reconnecting = false;
                        debug!("client: reconnected");
                        return;
                    }
                    Err(err) => {
                        warn!("client: reconnect attempt failed: {err}");
                        delay = std::cmp::min(delay * 2, config.reconnect_delay_max);
                    }
                }
            }
        });
    }

    pub async fn read_coils(
        &self,
        address: u16,
        quantity: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::read_bits(&self.config.limits, address, quantity)?;
        self.call(Request::ReadCoils { address, quantity }, device_id)
            .await
    }

    pub async fn read_discrete_inputs(
        &self,
        address: u16,
        quantity: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::read_bits(&self.config.limits, address, quantity)?;
        self.call(Request::ReadDiscreteInputs { address, quantity }, device_id)
            .await
    }

    pub async fn read_holding_registers(
        &self,
        address: u16,
        quantity: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::read_registers(&self.config.limits, address, quantity)?;
        self.call(
            Request::ReadHoldingRegisters { address, quantity },
            device_id,
        )
        .await
    }

    pub async fn read_input_registers(
        &self,
        address: u16,
        quantity: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::read_registers(&self.config.limits, address, quantity)?;
        self.call(
            Request::ReadInputRegisters { address, quantity },
            device_id,
        )
        .await
    }

    pub async fn write_single_coil(
        &self,
        address: u16,
        value: bool,
        device_id: u8,
    ) -> Result<PduReply> {
        self.call(Request::WriteSingleCoil { address, value }, device_id)
            .await
    }

    pub async fn write_single_register(
        &self,
        address: u16,
        value: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        self.call(Request::WriteSingleRegister { address, value }, device_id)
            .await
    }

    pub async fn write_multiple_coils(
        &self,
        address: u16,
        values: Vec<bool>,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::write_bits(&self.config.limits, address, values.len() as u16)?;
        self.call(Request::WriteMultipleCoils { address, values }, device_id)
            .await
    }

    pub async fn write_multiple_registers(
        &self,
        address: u16,
        values: Vec<u16>,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::write_registers(&self.config.limits, address, values.len() as u16)?;
        self.call(
            Request::WriteMultipleRegisters { address, values },
            device_id,
        )
        .await
    }

    pub async fn mask_write_register(
        &self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
        device_id: u8,
    ) -> Result<PduReply> {
        self.call(
            Request::MaskWriteRegister {
                address,
                and_mask,
                or_mask,
            },
            device_id,
        )
        .await
    }

    /// The combined read/write call (FC 23): one round trip writes
    /// `write_values` at `write_address` and reads `read_quantity`
    /// registers back from `read_address`.
    pub async fn readwrite_registers(
        &self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_values: Vec<u16>,
        device_id: u8,
    ) -> Result<PduReply> {
        validate::readwrite_registers(
            &self.config.limits,
            read_address,
            read_quantity,
            write_address,
            write_values.len() as u16,
        )?;
        self.call(
            Request::ReadWriteMultipleRegisters {
                read_address,
                read_quantity,
                write_address,
                write_values,
            },
            device_id,
        )
        .await
    }

    pub async fn read_exception_status(&self, device_id: u8) -> Result<PduReply> {
        self.call(Request::ReadExceptionStatus, device_id).await
    }

    pub async fn diagnostics(
        &self,
        sub_function: u16,
        data: Vec<u16>,
        device_id: u8,
    ) -> Result<PduReply> {
        self.call(
            Request::Diagnostics { sub_function, data },
            device_id,
        )
        .await
    }

    pub async fn get_comm_event_counter(&self, device_id: u8) -> Result<PduReply> {
        self.call(Request::GetCommEventCounter, device_id).await
    }

    pub async fn get_comm_event_log(&self, device_id: u8) -> Result<PduReply> {
        self.call(Request::GetCommEventLog, device_id).await
    }

    pub async fn report_server_id(&self, device_id: u8) -> Result<PduReply> {
        self.call(Request::ReportServerId, device_id).await
    }

    pub async fn read_device_identification(
        &self,
        read_device_id_code: u8,
        object_id: u8,
        device_id: u8,
    ) -> Result<PduReply> {
        self.call(
            Request::ReadDeviceIdentification {
                read_device_id_code,
                object_id,
            },
            device_id,
        )
        .await
    }

    pub async fn read_file_record(
        &self,
        requests: Vec<FileRecordReadRequest>,
        device_id: u8,
    ) -> Result<PduReply> {
        if requests.is_empty() {
            return Err(Error::parameter("read_file_record requires at least one sub-request"));
        }
        self.call(Request::ReadFileRecord { requests }, device_id)
            .await
    }

    pub async fn write_file_record(
        &self,
        requests: Vec<FileRecordWriteRequest>,
        device_id: u8,
    ) -> Result<PduReply> {
        if requests.is_empty() {
            return Err(Error::parameter("write_file_record requires at least one sub-request"));
        }
        self.call(Request::WriteFileRecord { requests }, device_id)
            .await
    }

    pub async fn read_fifo_queue(&self, address: u16, device_id: u8) -> Result<PduReply> {
        self.call(Request::ReadFifoQueue { address }, device_id)
            .await
    }
}

/// Spreads reconnect attempts by up to 20% so that many clients losing
/// the same link at once don't all redial in lockstep.
fn jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 5;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
}

fn manager_config(config: &ClientConfig) -> ManagerConfig {
    ManagerConfig {
        concurrency: config.framer.concurrency(),
        timeout_request: config.timeout_request,
        retries: config.retries,
        ..ManagerConfig::default()
    }
}

/// Whether a request is one the broadcast path (device id 0) is
/// meaningful for: a write. Reads have no peer to answer them under
/// broadcast, so the client rejects those before ever building a frame.
fn is_broadcastable(request: &Request) -> bool {
    matches!(
        request,
        Request::WriteSingleCoil { .. }
            | Request::WriteSingleRegister { .. }
            | Request::WriteMultipleCoils { .. }
            | Request::WriteMultipleRegisters { .. }
            | Request::MaskWriteRegister { .. }
            | Request::WriteFileRecord { .. }
    )
}

/// The logical success value a broadcast write settles with once the
/// manager's silent interval elapses: there was never a reply on the
/// wire (invariant 8), so this echoes the request the way a unicast
/// write's real reply would have.
fn broadcast_echo(request: &Request) -> Response {
    match request {
        Request::WriteSingleCoil { address, value } => Response::WriteSingleCoil {
            address: *address,
            value: *value,
        },
        Request::WriteSingleRegister { address, value } => Response::WriteSingleRegister {
            address: *address,
            value: *value,
        },
        Request::WriteMultipleCoils { address, values } => Response::WriteMultipleCoils {
            address: *address,
            quantity: values.len() as u16,
        },
        Request::WriteMultipleRegisters { address, values } => Response::WriteMultipleRegisters {
            address: *address,
            quantity: values.len() as u16,
        },
        Request::MaskWriteRegister {
            address,
            and_mask,
            or_mask,
        } => Response::MaskWriteRegister {
            address: *address,
            and_mask: *and_mask,
            or_mask: *or_mask,
        },
        Request::WriteFileRecord { requests } => Response::WriteFileRecord {
            requests: requests.clone(),
        },
        other => unreachable!("is_broadcastable rejected non-write request {other:?} earlier"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MbapFramer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// An in-process loopback transport: bytes written become readable
    /// from the other end, letting these tests drive a [`Client`]
    /// without a real socket.
    struct LoopbackTransport {
        outbox: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl StreamTransport for LoopbackTransport {
        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            let _ = self.outbox.send(bytes.to_vec());
            Ok(())
        }

        async fn receive(&mut self) -> Result<Vec<u8>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn on_close(&mut self, _callback: Box<dyn FnOnce() + Send>) {}
    }

    #[tokio::test]
    async fn broadcast_write_returns_success_without_a_wire_reply() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport { outbox: tx };
        let manager = TransactionManager::spawn(
            Box::new(transport),
            Box::new(MbapFramer::new()),
            ManagerConfig {
                broadcast_silent_interval: Duration::from_millis(5),
                ..ManagerConfig::default()
            },
        );
        let client = Client {
            state: Arc::new(Mutex::new(State {
                manager: Some(manager),
                reconnecting: false,
            })),
            connect: Arc::new(|| Box::pin(async { Err(Error::connection("no reconnect in test")) })),
            config: ClientConfig::default(),
        };

        let reply = client
            .write_single_register(0, 42, 0)
            .await
            .expect("broadcast call should succeed");
        assert_eq!(
            reply,
            PduReply::Ok(Response::WriteSingleRegister {
                address: 0,
                value: 42
            })
        );
    }

    #[tokio::test]
    async fn broadcast_read_is_rejected_as_a_parameter_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = LoopbackTransport { outbox: tx };
        let manager = TransactionManager::spawn(
            Box::new(transport),
            Box::new(MbapFramer::new()),
            ManagerConfig::default(),
        );
        let client = Client {
            state: Arc::new(Mutex::new(State {
                manager: Some(manager),
                reconnecting: false,
            })),
            connect: Arc::new(|| Box::pin(async { Err(Error::connection("no reconnect in test")) })),
            config: ClientConfig::default(),
        };

        let result = client.read_holding_registers(0, 1, 0).await;
        assert!(matches!(result, Err(Error::Parameter(_))));
    }

    #[tokio::test]
    async fn out_of_range_quantity_never_reaches_the_manager() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let (tx, _rx) = mpsc::unbounded_channel();
        struct CountingTransport {
            outbox: mpsc::UnboundedSender<Vec<u8>>,
            calls: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl StreamTransport for CountingTransport {
            async fn send(&mut self, bytes: &[u8]) -> Result<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let _ = self.outbox.send(bytes.to_vec());
                Ok(())
            }
            async fn receive(&mut self) -> Result<Vec<u8>> {
                std::future::pending().await
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
            fn on_close(&mut self, _callback: Box<dyn FnOnce() + Send>) {}
        }
        let transport = CountingTransport {
            outbox: tx,
            calls: calls_clone,
        };
        let manager = TransactionManager::spawn(
            Box::new(transport),
            Box::new(MbapFramer::new()),
            ManagerConfig::default(),
        );
        let client = Client {
            state: Arc::new(Mutex::new(State {
                manager: Some(manager),
                reconnecting: false,
            })),
            connect: Arc::new(|| Box::pin(async { Err(Error::connection("no reconnect in test")) })),
            config: ClientConfig::default(),
        };

        let result = client.read_holding_registers(0, 0, 1).await;
        assert!(matches!(result, Err(Error::Parameter(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
