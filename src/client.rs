//! Client (ASP) side: dial out and run the activation handshake.

use crate::config::Config;
use crate::conn::{self, Conn};
use crate::errors::Result;
use crate::fsm::Role;
use crate::sctp::{scheme_to_sctp, SctpAssociation, StreamConfig};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Establish an M3UA association as a client (ASP).
///
/// `scheme` is one of `m3ua`, `m3ua4`, `m3ua6`. After the transport comes
/// up, the ASPSM/ASPTM handshake and heartbeats are handled in background
/// tasks; the call returns once the association reaches Active, or fails
/// after the establishment timeout.
#[instrument(skip(cfg, cancel))]
pub async fn connect(
    scheme: &str,
    local_addr: Option<SocketAddr>,
    remote_addr: SocketAddr,
    cfg: Config,
    cancel: CancellationToken,
) -> Result<Conn> {
    let transport = scheme_to_sctp(scheme)?;
    let streams = StreamConfig {
        inbound_streams: cfg.streams,
        outbound_streams: cfg.streams,
    };
    info!(%remote_addr, "connecting");
    let sctp =
        SctpAssociation::connect(transport, local_addr, remote_addr, streams, &cfg.sack).await?;
    conn::establish(Role::Client, sctp, cfg, cancel).await
}
