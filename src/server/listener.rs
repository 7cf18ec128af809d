//! Server lifecycle (§5): `create -> bind -> serve_forever -> shutdown`.
//!
//! `Server` itself is accept-source-agnostic: it drives whatever
//! [`Acceptor`] it's handed, spawning one connection task per accepted
//! transport against a shared, mutex-guarded [`ServerContext`] (§5: no
//! per-block locking needed because dispatch serializes on that one
//! mutex). [`TcpAcceptor`] covers the common listening-socket case;
//! [`SingleAcceptor`] lets a point-to-point link (RTU/ASCII over one
//! serial port) reuse the same lifecycle instead of a separate code path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::datastore::ServerContext;
use crate::error::{Error, Result};
use crate::frame::Framer;
use crate::transport::{StreamTransport, TcpTransport};

use super::config::ServerConfig;
use super::connection;

/// Source of incoming connections for [`Server::serve_forever`].
#[async_trait]
pub trait Acceptor: Send {
    async fn accept(&mut self) -> Result<Box<dyn StreamTransport>>;
}

/// Accepts TCP connections on a bound listening socket.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Box<dyn StreamTransport>> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::connection(e.to_string()))?;
        debug!("server: accepted TCP connection from {peer}");
        Ok(Box::new(TcpTransport::from_stream(stream)))
    }
}

/// Yields one already-connected transport, then blocks forever: the
/// degenerate "accept" source for a point-to-point link (a serial port),
/// whose single connection lasts until `shutdown` or the link itself
/// closes.
pub struct SingleAcceptor {
    transport: Option<Box<dyn StreamTransport>>,
}

impl SingleAcceptor {
    pub fn new(transport: Box<dyn StreamTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

#[async_trait]
impl Acceptor for SingleAcceptor {
    async fn accept(&mut self) -> Result<Box<dyn StreamTransport>> {
        match self.transport.take() {
            Some(transport) => Ok(transport),
            None => std::future::pending().await,
        }
    }
}

/// The long-lived server: a shared datastore context plus the lifecycle
/// around accepting connections against it.
pub struct Server {
    context: Arc<Mutex<ServerContext>>,
    config: Arc<ServerConfig>,
    serving: Arc<AtomicBool>,
    shutdown_tx: Arc<StdMutex<Option<broadcast::Sender<()>>>>,
}

impl Server {
    pub fn new(context: ServerContext, config: ServerConfig) -> Self {
        Self {
            context: Arc::new(Mutex::new(context)),
            config: Arc::new(config),
            serving: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Arc::new(StdMutex::new(None)),
        }
    }

    /// Accepts connections from `acceptor` until `shutdown` is called,
    /// spawning one task per connection via `framer_factory` (each
    /// connection gets its own framer instance and buffer). Fails with
    /// [`Error::Parameter`] if the server is already serving.
    pub async fn serve_forever<A, F>(&self, mut acceptor: A, framer_factory: F) -> Result<()>
    where
        A: Acceptor,
        F: Fn() -> Box<dyn Framer + Send> + Send + Sync + 'static,
    {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(Error::parameter(
                "serve_forever called on a server that is already serving",
            ));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx.clone());

        let mut tasks = JoinSet::new();
        loop {
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::select! {
                accepted = acceptor.accept() => {
                    match accepted {
                        Ok(transport) => {
                            let context = self.context.clone();
                            let config = self.config.clone();
                            let framer = framer_factory();
                            let conn_shutdown = shutdown_tx.subscribe();
                            tasks.spawn(connection::serve_connection(
                                transport,
                                framer,
                                context,
                                config,
                                conn_shutdown,
                            ));
                        }
                        Err(err) => {
                            warn!("server: accept failed: {err}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("server: shutdown requested, draining connections");
                    break;
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        self.serving.store(false, Ordering::SeqCst);
        *self.shutdown_tx.lock().unwrap() = None;
        Ok(())
    }

    /// Signals every live connection to close and lets a blocked
    /// `serve_forever` return once they've all drained. Idempotent only
    /// while serving; calling it when nothing is serving is a
    /// programmer error.
    pub fn shutdown(&self) -> Result<()> {
        match self.shutdown_tx.lock().unwrap().as_ref() {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(Error::parameter("server is not currently serving")),
        }
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::block::SequentialBlock;
    use crate::datastore::DeviceContext;
    use crate::frame::MbapFramer;

    fn empty_context() -> ServerContext {
        ServerContext::Single(DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 8])),
            Box::new(SequentialBlock::new(0, vec![false; 8])),
            Box::new(SequentialBlock::new(0, vec![0u16; 8])),
            Box::new(SequentialBlock::new(0, vec![0u16; 8])),
        ))
    }

    #[tokio::test]
    async fn double_serve_forever_is_rejected() {
        let server = Arc::new(Server::new(empty_context(), ServerConfig::default()));
        let acceptor = SingleAcceptor::new(Box::new(NeverClosesTransport));

        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_forever(acceptor, || Box::new(MbapFramer::new()))
                .await
        });

        // Give the first serve_forever a chance to flip the flag.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let second = server
            .serve_forever(SingleAcceptor::new(Box::new(NeverClosesTransport)), || {
                Box::new(MbapFramer::new())
            })
            .await;
        assert!(matches!(second, Err(Error::Parameter(_))));

        server.shutdown().unwrap();
        handle.await.unwrap().unwrap();
    }

    struct NeverClosesTransport;

    #[async_trait]
    impl StreamTransport for NeverClosesTransport {
        async fn send(&mut self, _bytes: &[u8]) -> Result<()> {
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
}
