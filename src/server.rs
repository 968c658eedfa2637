//! Server (SGP) side: listen and answer the activation handshake.

use crate::config::Config;
use crate::conn::{self, Conn};
use crate::errors::{Error, Result};
use crate::fsm::Role;
use crate::sctp::{scheme_to_sctp, SctpListener, StreamConfig};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// An M3UA listener producing server-role associations.
pub struct Listener {
    sctp: SctpListener,
    cfg: Config,
}

impl Listener {
    /// Bind a listener. `scheme` is one of `m3ua`, `m3ua4`, `m3ua6`.
    #[instrument(skip(cfg))]
    pub async fn bind(scheme: &str, local_addr: SocketAddr, cfg: Config) -> Result<Self> {
        let transport = scheme_to_sctp(scheme)?;
        let streams = StreamConfig {
            inbound_streams: cfg.streams,
            outbound_streams: cfg.streams,
        };
        let sctp = SctpListener::bind(transport, local_addr, streams, cfg.sack.clone()).await?;
        Ok(Self { sctp, cfg })
    }

    /// Wait for the next association and drive it to Active. Signals other
    /// than payload data are handled in background tasks afterwards.
    pub async fn accept(&self, cancel: &CancellationToken) -> Result<Conn> {
        let assoc = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::FailedToEstablish),
            res = self.sctp.accept() => res?,
        };
        conn::establish(Role::Server, assoc, self.cfg.clone(), cancel.child_token()).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sctp.local_addr()?)
    }
}
