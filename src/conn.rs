//! Association runtime
//!
//! One [`Conn`] owns one association. A monitor task serializes state
//! updates and consumes asynchronous errors; a reader task pulls packets
//! off the transport and hands each decoded message to a short-lived
//! dispatcher; the heartbeat task runs alongside once released. Callers
//! drive reads, writes and close.

use crate::config::Config;
use crate::errors::{CodecError, Error, Result, SctpError};
use crate::fsm::{self, AspState, EntryAction, Role};
use crate::heartbeat;
use crate::messages::{Message, ProtocolData};
use crate::sctp::{SctpAssociation, SendInfo};
use bytes::Bytes;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Wait for the "established" signal this long before giving up.
const ESTABLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the payload queue awaiting `read_payload`.
const DATA_CHAN_CAPACITY: usize = 0xffff;

/// An established M3UA association.
pub struct Conn {
    inner: Arc<ConnInner>,
}

/// Senders for the coordination channels; taken exactly once at teardown
/// so every consumer observes closure.
#[derive(Clone)]
struct TxSet {
    state: mpsc::Sender<AspState>,
    err: mpsc::Sender<Error>,
    data: mpsc::Sender<ProtocolData>,
    beat_ack: mpsc::Sender<()>,
    beat_allow: mpsc::Sender<()>,
    established: mpsc::Sender<()>,
}

pub(crate) struct ConnInner {
    role: Role,
    pub(crate) cfg: Config,
    sctp: SctpAssociation,
    /// Immutable send-info template; every send copies it and overrides
    /// the stream id on the copy.
    sctp_info: SendInfo,
    max_outbound: u16,
    state: RwLock<AspState>,
    tx: StdMutex<Option<TxSet>>,
    data_rx: Mutex<mpsc::Receiver<ProtocolData>>,
    /// Last heartbeat challenge sent, for ack validation.
    pub(crate) last_beat: StdMutex<Option<Bytes>>,
    pub(crate) cancel: CancellationToken,
}

/// Arm the runtime for a fresh association and wait for establishment.
pub(crate) async fn establish(
    role: Role,
    sctp: SctpAssociation,
    cfg: Config,
    cancel: CancellationToken,
) -> Result<Conn> {
    let status = sctp.status();
    let max_outbound = status.outbound_streams.saturating_sub(1);

    let (state_tx, state_rx) = mpsc::channel(1);
    let (err_tx, err_rx) = mpsc::channel(1);
    let (data_tx, data_rx) = mpsc::channel(DATA_CHAN_CAPACITY);
    let (beat_ack_tx, beat_ack_rx) = mpsc::channel(1);
    let (beat_allow_tx, beat_allow_rx) = mpsc::channel(1);
    let (established_tx, mut established_rx) = mpsc::channel(1);

    let inner = Arc::new(ConnInner {
        role,
        cfg,
        sctp,
        sctp_info: SendInfo::m3ua(),
        max_outbound,
        state: RwLock::new(AspState::Down),
        tx: StdMutex::new(Some(TxSet {
            state: state_tx.clone(),
            err: err_tx,
            data: data_tx,
            beat_ack: beat_ack_tx,
            beat_allow: beat_allow_tx,
            established: established_tx,
        })),
        data_rx: Mutex::new(data_rx),
        last_beat: StdMutex::new(None),
        cancel: cancel.child_token(),
    });

    if inner.cfg.heartbeat.active() {
        tokio::spawn(heartbeat::run(inner.clone(), beat_allow_rx, beat_ack_rx));
    }
    tokio::spawn(monitor(inner.clone(), state_rx, err_rx));
    tokio::spawn(reader(inner.clone()));

    // Kick the state machine; for a client this emits the first ASP Up.
    let _ = state_tx.send(AspState::Down).await;

    let conn = Conn { inner };
    match time::timeout(ESTABLISH_TIMEOUT, established_rx.recv()).await {
        Ok(Some(())) => {
            info!(role = ?role, remote = %conn.remote_addr(), "association established");
            Ok(conn)
        }
        Ok(None) => Err(Error::FailedToEstablish),
        Err(_) => {
            let _ = conn.close().await;
            Err(Error::Timeout)
        }
    }
}

impl Conn {
    /// Current ASP state.
    pub async fn state(&self) -> AspState {
        *self.inner.state.read().await
    }

    /// Highest stream id usable for payload data.
    pub fn max_outbound_streams(&self) -> u16 {
        self.inner.max_outbound
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.sctp.local_addr()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.sctp.remote_addr()
    }

    /// Next Transfer payload with its MTP3 routing label.
    pub async fn read_payload(&self) -> Result<ProtocolData> {
        if *self.inner.state.read().await != AspState::Active {
            return Err(Error::NotEstablished);
        }
        let mut rx = self.inner.data_rx.lock().await;
        rx.recv().await.ok_or(Error::NotEstablished)
    }

    /// Read the next payload's user data into `buf`; returns the number of
    /// octets copied.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let pd = self.read_payload().await?;
        let n = pd.data.len().min(buf.len());
        buf[..n].copy_from_slice(&pd.data[..n]);
        Ok(n)
    }

    /// Send user data with the configured MTP3 routing defaults. Returns
    /// the number of payload octets written.
    pub async fn write_payload(&self, b: &[u8], stream_id: Option<u16>) -> Result<usize> {
        let cfg = &self.inner.cfg;
        let pd = ProtocolData::new(
            cfg.originating_point_code,
            cfg.destination_point_code,
            cfg.service_indicator,
            cfg.network_indicator,
            cfg.message_priority,
            cfg.signaling_link_selection,
            Bytes::copy_from_slice(b),
        );
        self.write_payload_with_protocol(pd, stream_id).await
    }

    /// Send user data with caller-specified MTP3 routing fields.
    #[instrument(skip(self, pd), fields(dpc = pd.dpc, len = pd.data.len()))]
    pub async fn write_payload_with_protocol(
        &self,
        pd: ProtocolData,
        stream_id: Option<u16>,
    ) -> Result<usize> {
        let inner = &self.inner;
        if *inner.state.read().await != AspState::Active {
            return Err(Error::NotEstablished);
        }
        let cfg = &inner.cfg;
        let written = pd.data.len();
        let msg = Message::Data {
            network_appearance: cfg.network_appearance,
            routing_contexts: cfg.routing_contexts.clone(),
            protocol_data: pd,
            correlation_id: cfg.correlation_id,
        };
        let sid = stream_id.unwrap_or_else(|| inner.pick_stream());
        inner.write_on_stream(&msg, sid).await?;
        Ok(written)
    }

    /// Send any signaling message on stream 0, e.g. Notify or an SSNM
    /// message. No state checking is applied.
    pub async fn write_signal(&self, msg: &Message) -> Result<usize> {
        self.inner.write_signal(msg).await
    }

    /// Close the association. Idempotent and safe under concurrent callers.
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}

impl ConnInner {
    fn txset(&self) -> Option<TxSet> {
        self.tx.lock().unwrap().clone()
    }

    pub(crate) async fn post_err(&self, e: Error) {
        if let Some(tx) = self.txset() {
            let _ = tx.err.send(e).await;
        }
    }

    async fn post_state(&self, s: AspState) {
        if let Some(tx) = self.txset() {
            let _ = tx.state.send(s).await;
        }
    }

    async fn post_current_state(&self) {
        let s = *self.state.read().await;
        self.post_state(s).await;
    }

    /// Send a signaling message on stream 0.
    pub(crate) async fn write_signal(&self, msg: &Message) -> Result<usize> {
        self.write_on_stream(msg, 0).await
    }

    async fn write_on_stream(&self, msg: &Message, stream_id: u16) -> Result<usize> {
        let buf = msg.encode();
        let mut info = self.sctp_info; // per-send copy
        info.stream_id = stream_id;
        self.sctp.send(&buf, info).await?;
        Ok(buf.len())
    }

    fn pick_stream(&self) -> u16 {
        match self.max_outbound {
            0 | 1 => self.max_outbound,
            m => rand::thread_rng().gen_range(1..=m),
        }
    }

    /// Apply a posted state: record it and perform the entry actions.
    async fn handle_state_update(&self, next: AspState) -> Result<()> {
        if self.tx.lock().unwrap().is_none() {
            return Err(Error::SctpNotAlive);
        }
        let previous = {
            let mut st = self.state.write().await;
            let prev = *st;
            *st = next;
            prev
        };
        if previous != next {
            debug!(?previous, ?next, "state transition");
        }
        for action in fsm::on_enter(self.role, next, previous)? {
            match action {
                EntryAction::SendAspUp => {
                    self.write_signal(&Message::AspUp {
                        asp_identifier: self.cfg.asp_identifier,
                        info_string: None,
                    })
                    .await?;
                }
                EntryAction::SendAspActive => {
                    self.write_signal(&Message::AspActive {
                        traffic_mode_type: self.cfg.traffic_mode,
                        routing_contexts: self.cfg.routing_contexts.clone(),
                        info_string: None,
                    })
                    .await?;
                }
                EntryAction::SignalEstablished => {
                    if let Some(tx) = self.txset() {
                        let _ = tx.established.try_send(());
                        let _ = tx.beat_allow.try_send(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Consume one asynchronous error: answer on the wire when the
    /// protocol maps it, otherwise report it back as fatal.
    async fn handle_error(&self, e: Error) -> Result<()> {
        warn!(error = %e, "association error");
        match e.to_wire(&self.cfg) {
            Some(msg) => {
                self.write_signal(&msg).await?;
                Ok(())
            }
            None => Err(e),
        }
    }

    /// Invoked per decoded inbound signal from a short-lived task.
    /// Transfer data never comes through here; the reader delivers it
    /// inline to keep per-stream order.
    async fn dispatch(&self, msg: Message, raw: Bytes, stream_id: u16) {
        self.log_signal(&msg);
        let state = *self.state.read().await;
        let last_beat = self.last_beat.lock().unwrap().clone();
        let out = fsm::on_message(
            self.role,
            state,
            stream_id,
            &msg,
            &raw,
            &self.cfg,
            last_beat.as_ref(),
        );
        if let Some(reply) = &out.reply {
            if self.write_signal(reply).await.is_err() {
                self.post_err(Error::FailedToWriteSignal).await;
                return;
            }
        }
        if out.beat_ack {
            if let Some(tx) = self.txset() {
                let _ = tx.beat_ack.send(()).await;
            }
        }
        if let Some(e) = out.error {
            self.post_err(e).await;
        }
        match out.next {
            Some(s) => self.post_state(s).await,
            None => self.post_current_state().await,
        }
        if out.close {
            let _ = self.shutdown().await;
        }
    }

    async fn handle_data(&self, msg: Message) {
        let state = *self.state.read().await;
        if state != AspState::Active {
            let e = Error::unexpected(&msg);
            self.post_err(e).await;
            return;
        }
        let pd = match msg {
            Message::Data { protocol_data, .. } => protocol_data,
            _ => return,
        };
        // Data for somebody else's point code is not ours to deliver.
        if pd.dpc != self.cfg.originating_point_code {
            self.post_err(Error::UnexpectedMessage {
                class: "Transfer",
                mtype: "Payload Data",
            })
            .await;
            return;
        }
        if let Some(tx) = self.txset() {
            let _ = tx.data.send(pd).await;
        }
    }

    fn log_signal(&self, msg: &Message) {
        match msg {
            Message::Error { code, .. } => {
                warn!(code, "peer reported error");
            }
            Message::Notify {
                status_type,
                status_info,
                ..
            } => {
                debug!(status_type, status_info, "received NOTIFY");
            }
            Message::Duna { .. }
            | Message::Dava { .. }
            | Message::Daud { .. }
            | Message::Scon { .. }
            | Message::Dupu { .. }
            | Message::Drst { .. } => {
                debug!(mtype = msg.type_name(), "ignoring SSNM message");
            }
            _ => {}
        }
    }

    /// Tear the association down: close the coordination channels exactly
    /// once, park the state at Down, then close the transport.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        {
            let mut st = self.state.write().await;
            if *st != AspState::Down {
                *st = AspState::Down;
                self.tx.lock().unwrap().take();
            }
        }
        self.cancel.cancel();
        self.sctp.close().await?;
        Ok(())
    }
}

/// Serializes state updates and consumes asynchronous errors.
async fn monitor(
    inner: Arc<ConnInner>,
    mut state_rx: mpsc::Receiver<AspState>,
    mut err_rx: mpsc::Receiver<Error>,
) {
    let cancel = inner.cancel.clone();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = inner.shutdown().await;
                return;
            }
            err = err_rx.recv() => match err {
                Some(e) => {
                    if let Err(fatal) = inner.handle_error(e).await {
                        warn!(error = %fatal, "closing association");
                        let _ = inner.shutdown().await;
                        return;
                    }
                }
                None => return,
            },
            state = state_rx.recv() => match state {
                Some(s) => {
                    if let Err(e) = inner.handle_state_update(s).await {
                        debug!(error = %e, "state update failed; closing");
                        let _ = inner.shutdown().await;
                        return;
                    }
                }
                None => return,
            },
        }
    }
}

/// Pulls packets off the transport, decodes and dispatches them.
async fn reader(inner: Arc<ConnInner>) {
    let cancel = inner.cancel.clone();
    loop {
        let res = tokio::select! {
            _ = cancel.cancelled() => return,
            r = inner.sctp.recv() => r,
        };
        match res {
            Ok((raw, info)) => match Message::decode(&raw) {
                // Payloads are delivered inline so per-stream order survives.
                Ok(msg @ Message::Data { .. }) => {
                    inner.handle_data(msg).await;
                    inner.post_current_state().await;
                }
                Ok(msg) => {
                    let worker = inner.clone();
                    tokio::spawn(async move {
                        worker.dispatch(msg, raw, info.stream_id).await;
                    });
                }
                Err(CodecError::InvalidVersion(v)) => {
                    inner.post_err(Error::InvalidVersion(v)).await;
                }
                Err(e) => {
                    // A single corrupt datagram must not kill the association.
                    debug!(error = %e, "ignoring undecodable packet");
                }
            },
            Err(e) => {
                let next = match e {
                    SctpError::PeerReset => AspState::SctpRi,
                    _ => AspState::SctpCdi,
                };
                debug!(error = %e, ?next, "transport read failed");
                inner.post_state(next).await;
                return;
            }
        }
    }
}
