//! Heartbeat (BEAT) engine
//!
//! Runs from monitor start but stays gated until the association first
//! reaches Active. Each round sends a fresh 128-octet random challenge and
//! waits for the matching ack within the expiration timer.

use crate::conn::ConnInner;
use crate::errors::Error;
use crate::messages::Message;
use bytes::Bytes;
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

/// Challenge size in octets.
const CHALLENGE_LEN: usize = 128;

pub(crate) async fn run(
    inner: Arc<ConnInner>,
    mut allow_rx: mpsc::Receiver<()>,
    mut ack_rx: mpsc::Receiver<()>,
) {
    let cancel = inner.cancel.clone();

    // Quiescent until the first transition into Active.
    tokio::select! {
        _ = cancel.cancelled() => return,
        gate = allow_rx.recv() => {
            if gate.is_none() {
                return;
            }
        }
    }
    debug!("heartbeat released");

    let interval = inner.cfg.heartbeat.interval();
    let timer = inner.cfg.heartbeat.timer();
    let mut challenge = [0u8; CHALLENGE_LEN];

    loop {
        rand::thread_rng().fill_bytes(&mut challenge);
        let data = Bytes::copy_from_slice(&challenge);
        *inner.last_beat.lock().unwrap() = Some(data.clone());

        if inner
            .write_signal(&Message::Heartbeat { data })
            .await
            .is_err()
        {
            inner.post_err(Error::FailedToWriteSignal).await;
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            ack = ack_rx.recv() => {
                if ack.is_none() {
                    // Channels were torn down; nothing more to watch.
                    return;
                }
            }
            _ = time::sleep(timer) => {
                warn!("heartbeat timer expired");
                inner.post_err(Error::HeartbeatExpired).await;
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = time::sleep(interval) => {}
        }
    }
}
