//! One server connection: owns its own framer buffer exclusively (§5, "is
//! never shared") and reads bytes, feeds the framer, dispatches every
//! completed frame through the pipeline, and writes back whatever
//! response it produced.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::datastore::ServerContext;
use crate::frame::{Framer, FrameEvent};
use crate::transport::StreamTransport;

use super::config::ServerConfig;
use super::pipeline;

pub(super) async fn serve_connection(
    mut transport: Box<dyn StreamTransport>,
    mut framer: Box<dyn Framer + Send>,
    context: Arc<Mutex<ServerContext>>,
    config: Arc<ServerConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = transport.receive() => {
                match received {
                    Ok(bytes) => {
                        let events = framer.feed(&bytes);
                        for event in events {
                            match event {
                                FrameEvent::Frame(frame) => {
                                    let response_pdu = {
                                        let mut guard = context.lock().await;
                                        pipeline::handle_frame(&frame, &mut guard, &config)
                                    };
                                    if let Some(pdu) = response_pdu {
                                        let bytes = framer.build(frame.device_id, &pdu, frame.transaction_id);
                                        if let Err(err) = transport.send(&bytes).await {
                                            warn!("server connection: failed to send reply: {err}");
                                            break;
                                        }
                                    }
                                }
                                FrameEvent::Invalid { reason } => {
                                    debug!("server connection: discarding bytes while resyncing: {reason}");
                                }
                            }
                        }
                    }
                    Err(err) => {
                        debug!("server connection closed: {err}");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!("server connection: shutting down on request");
                break;
            }
        }
    }
    let _ = transport.close().await;
}
