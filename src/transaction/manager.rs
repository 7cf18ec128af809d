//! The transaction manager's driving task.
//!
//! One task owns one transport connection (§5: "cooperative, task-based";
//! suspension points are exactly the I/O boundaries). Callers talk to it
//! through an `mpsc` command channel and get their answer back on a
//! `oneshot`, the same shape `comsrv`'s connection actors use to keep a
//! connection's mutable state off any lock.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::{DecodedFrame, FrameEvent, Framer};
use crate::transport::StreamTransport;

use super::state::TransactionState;
use super::types::{Concurrency, InboundReply, ManagerConfig, OutboundRequest};

type ReplyTx = oneshot::Sender<Result<InboundReply>>;

struct Pending {
    device_id: u8,
    function_code: u8,
    pdu: Vec<u8>,
    transaction_id: Option<u16>,
    reply: ReplyTx,
    state: TransactionState,
    deadline: tokio::time::Instant,
    retries_left: u32,
    is_broadcast: bool,
}

enum Command {
    Call {
        request: OutboundRequest,
        reply: ReplyTx,
    },
}

/// Handle to a running transaction manager task.
///
/// Cloning a handle shares the same connection and in-flight bookkeeping;
/// the task itself exits once every handle has been dropped (the `mpsc`
/// channel closes) and no work remains.
#[derive(Clone)]
pub struct TransactionManager {
    commands: mpsc::Sender<Command>,
}

impl TransactionManager {
    /// Spawns the manager over `transport`, using `framer` to build
    /// outbound frames and decode inbound bytes. The task owns both for
    /// its lifetime; there is no reconnect here (see the module docs).
    pub fn spawn(
        transport: Box<dyn StreamTransport>,
        framer: Box<dyn Framer + Send>,
        config: ManagerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run(transport, framer, config, rx));
        Self { commands: tx }
    }

    /// Sends one request and awaits its matched reply, a broadcast's
    /// silent-interval success, or a transport/timeout failure.
    ///
    /// Never fails for a protocol-level exception: that comes back as an
    /// ordinary `Ok(InboundReply)` whose PDU bytes the caller decodes with
    /// [`crate::pdu::decode_reply`], which may itself be
    /// `PduReply::Exception`.
    pub async fn call(&self, request: OutboundRequest) -> Result<InboundReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Call {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::connection("transaction manager task is no longer running"))?;
        reply_rx
            .await
            .map_err(|_| Error::connection("transaction manager dropped the request"))?
    }
}

async fn run(
    mut transport: Box<dyn StreamTransport>,
    mut framer: Box<dyn Framer + Send>,
    config: ManagerConfig,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut next_transaction_id: u16 = 1;
    let mut pending: HashMap<u16, Pending> = HashMap::new();
    let mut queue: VecDeque<Pending> = VecDeque::new();
    let mut in_flight: Option<Pending> = None;

    loop {
        let wake_at = next_deadline(&config.concurrency, &pending, &in_flight)
            .unwrap_or_else(|| tokio::time::Instant::now() + std::time::Duration::from_secs(3600));

        tokio::select! {
            maybe_cmd = commands.recv() => {
                match maybe_cmd {
                    Some(Command::Call { request, reply }) => {
                        accept(
                            &config,
                            transport.as_mut(),
                            framer.as_ref(),
                            &mut next_transaction_id,
                            &mut pending,
                            &mut queue,
                            &mut in_flight,
                            request,
                            reply,
                        )
                        .await;
                    }
                    None => {
                        debug!("transaction manager: last handle dropped, shutting down");
                        break;
                    }
                }
            }
            received = transport.receive() => {
                match received {
                    Ok(bytes) => {
                        let events = framer.feed(&bytes);
                        for event in events {
                            handle_event(event, config.concurrency, &mut pending, &mut in_flight);
                        }
                        advance_queue(&config, transport.as_mut(), framer.as_ref(), &mut queue, &mut in_flight).await;
                    }
                    Err(err) => {
                        warn!("transaction manager: transport failed: {err}");
                        fail_all(pending, queue, in_flight, err);
                        let _ = transport.close().await;
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(wake_at) => {
                expire_timeouts(
                    &config,
                    transport.as_mut(),
                    framer.as_ref(),
                    &mut pending,
                    &mut queue,
                    &mut in_flight,
                )
                .await;
            }
        }
    }
}

async fn send_entry(
    transport: &mut dyn StreamTransport,
    framer: &(dyn Framer + Send),
    entry: &Pending,
) -> Result<()> {
    let bytes = framer.build(entry.device_id, &entry.pdu, entry.transaction_id);
    transport.send(&bytes).await
}

#[allow(clippy::too_many_arguments)]
async fn accept(
    config: &ManagerConfig,
    transport: &mut dyn StreamTransport,
    framer: &(dyn Framer + Send),
    next_transaction_id: &mut u16,
    pending: &mut HashMap<u16, Pending>,
    queue: &mut VecDeque<Pending>,
    in_flight: &mut Option<Pending>,
    request: OutboundRequest,
    reply: ReplyTx,
) {
    let is_broadcast = request.is_broadcast();
    let transaction_id = match config.concurrency {
        Concurrency::Concurrent => {
            let tid = *next_transaction_id;
            *next_transaction_id = next_transaction_id.wrapping_add(1);
            Some(tid)
        }
        Concurrency::Serialized => None,
    };
    let deadline = tokio::time::Instant::now() + silent_or_request_timeout(config, is_broadcast);
    let entry = Pending {
        device_id: request.device_id,
        function_code: request.function_code,
        pdu: request.pdu,
        transaction_id,
        reply,
        state: TransactionState::Sent,
        deadline,
        retries_left: config.retries,
        is_broadcast,
    };

    match config.concurrency {
        Concurrency::Concurrent => {
            let tid = entry.transaction_id.expect("concurrent mode always assigns a tid");
            if let Err(err) = send_entry(transport, framer, &entry).await {
                let _ = entry.reply.send(Err(err));
                return;
            }
            pending.insert(tid, entry);
        }
        Concurrency::Serialized => {
            if in_flight.is_some() {
                queue.push_back(entry);
                return;
            }
            if let Err(err) = send_entry(transport, framer, &entry).await {
                let _ = entry.reply.send(Err(err));
                return;
            }
            *in_flight = Some(entry);
        }
    }
}

fn silent_or_request_timeout(config: &ManagerConfig, is_broadcast: bool) -> std::time::Duration {
    if is_broadcast {
        config.broadcast_silent_interval
    } else {
        config.timeout_request
    }
}

fn handle_event(
    event: FrameEvent,
    concurrency: Concurrency,
    pending: &mut HashMap<u16, Pending>,
    in_flight: &mut Option<Pending>,
) {
    let frame = match event {
        FrameEvent::Frame(frame) => frame,
        FrameEvent::Invalid { reason } => {
            warn!("transaction manager: discarding bytes while resyncing: {reason}");
            return;
        }
    };

    match concurrency {
        Concurrency::Concurrent => {
            let Some(tid) = frame.transaction_id else {
                warn!("transaction manager: concurrent transport produced a frame without a transaction id");
                return;
            };
            // Invariant 7: a reply with an unknown transaction id is
            // dropped; no waiter is spuriously completed.
            let Some(entry) = pending.remove(&tid) else {
                debug!("transaction manager: dropping reply for unknown transaction id {tid}");
                return;
            };
            complete(entry, frame);
        }
        Concurrency::Serialized => {
            if matches!(in_flight, Some(e) if e.is_broadcast) {
                debug!("transaction manager: ignoring unexpected reply during broadcast silence");
                return;
            }
            let Some(entry) = in_flight.take() else {
                debug!("transaction manager: dropping reply with nothing in flight");
                return;
            };
            complete(entry, frame);
        }
    }
}

fn complete(entry: Pending, frame: DecodedFrame) {
    let reply_fc = frame.pdu.first().copied().unwrap_or(0) & 0x7F;
    if reply_fc != entry.function_code {
        let _ = entry.reply.send(Err(Error::invalid_message(format!(
            "reply function code 0x{reply_fc:02X} does not match request 0x{:02X}",
            entry.function_code
        ))));
        return;
    }
    let _ = entry.reply.send(Ok(InboundReply {
        device_id: frame.device_id,
        pdu: frame.pdu,
    }));
}

async fn advance_queue(
    config: &ManagerConfig,
    transport: &mut dyn StreamTransport,
    framer: &(dyn Framer + Send),
    queue: &mut VecDeque<Pending>,
    in_flight: &mut Option<Pending>,
) {
    if in_flight.is_some() {
        return;
    }
    while let Some(mut next) = queue.pop_front() {
        next.deadline =
            tokio::time::Instant::now() + silent_or_request_timeout(config, next.is_broadcast);
        match send_entry(transport, framer, &next).await {
            Ok(()) => {
                *in_flight = Some(next);
                return;
            }
            Err(err) => {
                let _ = next.reply.send(Err(err));
            }
        }
    }
}

/// Resolves one expired entry: a broadcast's "silence" simply means
/// success (no reply was ever coming); an ordinary request retries while
/// it has attempts left, else times out. Returns the entry to resend, or
/// `None` once it has reached a terminal state.
fn retry_or_fail(mut entry: Pending) -> Option<Pending> {
    if entry.is_broadcast {
        let _ = entry.reply.send(Ok(InboundReply {
            device_id: entry.device_id,
            pdu: Vec::new(),
        }));
        return None;
    }
    if entry.retries_left > 0 {
        entry.retries_left -= 1;
        entry.state = TransactionState::Sent;
        return Some(entry);
    }
    let _ = entry.reply.send(Err(Error::timeout(format!(
        "no reply to function code 0x{:02X} before the deadline, retries exhausted",
        entry.function_code
    ))));
    None
}

async fn expire_timeouts(
    config: &ManagerConfig,
    transport: &mut dyn StreamTransport,
    framer: &(dyn Framer + Send),
    pending: &mut HashMap<u16, Pending>,
    queue: &mut VecDeque<Pending>,
    in_flight: &mut Option<Pending>,
) {
    let now = tokio::time::Instant::now();

    let expired_tids: Vec<u16> = pending
        .iter()
        .filter(|(_, entry)| entry.deadline <= now)
        .map(|(tid, _)| *tid)
        .collect();
    for tid in expired_tids {
        let entry = pending.remove(&tid).expect("tid just observed in the map");
        if let Some(mut retried) = retry_or_fail(entry) {
            retried.deadline =
                now + silent_or_request_timeout(config, retried.is_broadcast);
            match send_entry(transport, framer, &retried).await {
                Ok(()) => {
                    let tid = retried.transaction_id.expect("concurrent mode always assigns a tid");
                    pending.insert(tid, retried);
                }
                Err(err) => {
                    let _ = retried.reply.send(Err(err));
                }
            }
        }
    }

    let Some(entry) = in_flight.take() else {
        return;
    };
    if entry.deadline > now {
        *in_flight = Some(entry);
        return;
    }
    match retry_or_fail(entry) {
        Some(mut retried) => {
            retried.deadline = now + silent_or_request_timeout(config, retried.is_broadcast);
            match send_entry(transport, framer, &retried).await {
                Ok(()) => *in_flight = Some(retried),
                Err(err) => {
                    let _ = retried.reply.send(Err(err));
                    advance_queue(config, transport, framer, queue, in_flight).await;
                }
            }
        }
        None => {
            advance_queue(config, transport, framer, queue, in_flight).await;
        }
    }
}

fn fail_all(
    pending: HashMap<u16, Pending>,
    queue: VecDeque<Pending>,
    in_flight: Option<Pending>,
    err: Error,
) {
    for (_, entry) in pending {
        let _ = entry.reply.send(Err(err.clone()));
    }
    for entry in queue {
        let _ = entry.reply.send(Err(err.clone()));
    }
    if let Some(entry) = in_flight {
        let _ = entry.reply.send(Err(err));
    }
}

fn next_deadline(
    concurrency: &Concurrency,
    pending: &HashMap<u16, Pending>,
    in_flight: &Option<Pending>,
) -> Option<tokio::time::Instant> {
    match concurrency {
        Concurrency::Concurrent => pending.values().map(|entry| entry.deadline).min(),
        Concurrency::Serialized => in_flight.as_ref().map(|entry| entry.deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// An in-process loopback transport pair: whatever is sent to one
    /// side becomes receivable from the other, so tests can drive the
    /// manager without real sockets.
    struct LoopbackTransport {
        inbox: Arc<Mutex<VecDeque<u8>>>,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
        notify: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl StreamTransport for LoopbackTransport {
        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            let _ = self.outbox.send(bytes.to_vec());
            Ok(())
        }

        async fn receive(&mut self) -> Result<Vec<u8>> {
            loop {
                {
                    let mut inbox = self.inbox.lock().unwrap();
                    if !inbox.is_empty() {
                        return Ok(inbox.drain(..).collect());
                    }
                }
                self.notify.notified().await;
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn on_close(&mut self, _callback: Box<dyn FnOnce() + Send>) {}
    }

    #[tokio::test]
    async fn unknown_transaction_id_is_dropped_without_completing_a_waiter() {
        use crate::frame::MbapFramer;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(tokio::sync::Notify::new());
        let transport = LoopbackTransport {
            inbox: inbox.clone(),
            outbox: tx,
            notify: notify.clone(),
        };

        let manager = TransactionManager::spawn(
            Box::new(transport),
            Box::new(MbapFramer::new()),
            ManagerConfig {
                timeout_request: Duration::from_millis(50),
                retries: 0,
                ..ManagerConfig::default()
            },
        );

        let call = tokio::spawn(manager.call(OutboundRequest {
            device_id: 1,
            function_code: 0x03,
            pdu: vec![0x03, 0x00, 0x00, 0x00, 0x01],
        }));

        let sent = rx.recv().await.expect("request bytes sent");
        assert_eq!(sent[6], 0x01); // device id
        let framer = MbapFramer::new();
        let bogus_reply = framer.build(1, &[0x03, 0x02, 0x00, 0x11], Some(0xFFFF));
        inbox.lock().unwrap().extend(bogus_reply);
        notify.notify_one();

        // The mismatched transaction id should be dropped; our call then
        // times out rather than completing with someone else's reply.
        let result = call.await.unwrap();
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
