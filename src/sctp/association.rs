//! Association setup and framed message exchange
//!
//! Each message travels as `[u32 frame_len][u16 stream_id][u32 ppid][data]`.
//! A short INIT / INIT-ACK exchange right after the TCP connection carries
//! each side's proposed stream counts; the negotiated outbound count is
//! `min(own outbound proposal, peer inbound proposal)`.

use super::{family_matches, ChunkType, SctpStatus, SendInfo, StreamConfig};
use crate::config::SackInfo;
use crate::errors::SctpError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const FRAME_HEADER_LEN: usize = 6;
const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + 0xffff;

/// Stream id reserved for negotiation chunks; never visible to users.
const CONTROL_STREAM: u16 = 0xffff;

/// A single SCTP-style association.
pub struct SctpAssociation {
    read_half: Mutex<OwnedReadHalf>,
    write_half: Mutex<OwnedWriteHalf>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    status: SctpStatus,
}

impl SctpAssociation {
    /// Connect to a remote peer and negotiate stream counts.
    #[instrument(skip(streams, sack), fields(remote = %remote_addr))]
    pub async fn connect(
        scheme: &str,
        local_addr: Option<SocketAddr>,
        remote_addr: SocketAddr,
        streams: StreamConfig,
        sack: &SackInfo,
    ) -> Result<Self, SctpError> {
        if !family_matches(scheme, &remote_addr) {
            return Err(SctpError::InvalidScheme(scheme.to_string()));
        }

        let socket = match remote_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        if let Some(laddr) = local_addr {
            socket
                .bind(laddr)
                .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        }
        let mut stream = socket
            .connect(remote_addr)
            .await
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;

        apply_sack(&stream, sack)?;

        send_chunk(&mut stream, ChunkType::Init, streams).await?;
        let (chunk, peer) = recv_chunk(&mut stream).await?;
        if chunk != ChunkType::InitAck as u8 {
            return Err(SctpError::Handshake(format!(
                "expected INIT-ACK, got chunk type {}",
                chunk
            )));
        }

        let assoc = Self::finish(stream, streams, peer)?;
        info!(
            local = %assoc.local_addr,
            outbound_streams = assoc.status.outbound_streams,
            "association established"
        );
        Ok(assoc)
    }

    /// Build the server side from an accepted TCP stream.
    async fn accept_from(
        mut stream: TcpStream,
        streams: StreamConfig,
        sack: &SackInfo,
    ) -> Result<Self, SctpError> {
        apply_sack(&stream, sack)?;

        let (chunk, peer) = recv_chunk(&mut stream).await?;
        if chunk != ChunkType::Init as u8 {
            return Err(SctpError::Handshake(format!(
                "expected INIT, got chunk type {}",
                chunk
            )));
        }
        send_chunk(&mut stream, ChunkType::InitAck, streams).await?;

        Self::finish(stream, streams, peer)
    }

    fn finish(
        stream: TcpStream,
        own: StreamConfig,
        peer: StreamConfig,
    ) -> Result<Self, SctpError> {
        let local_addr = stream
            .local_addr()
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        let remote_addr = stream
            .peer_addr()
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        let status = SctpStatus {
            outbound_streams: own.outbound_streams.min(peer.inbound_streams),
            inbound_streams: own.inbound_streams.min(peer.outbound_streams),
        };
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            read_half: Mutex::new(read_half),
            write_half: Mutex::new(write_half),
            local_addr,
            remote_addr,
            status,
        })
    }

    /// Negotiated association status.
    pub fn status(&self) -> SctpStatus {
        self.status
    }

    /// Send one message with the given send-info.
    pub async fn send(&self, data: &[u8], info: SendInfo) -> Result<usize, SctpError> {
        let mut frame = BytesMut::with_capacity(4 + FRAME_HEADER_LEN + data.len());
        frame.put_u32((FRAME_HEADER_LEN + data.len()) as u32);
        frame.put_u16(info.stream_id);
        frame.put_u32(info.ppid);
        frame.put_slice(data);

        let mut half = self.write_half.lock().await;
        half.write_all(&frame)
            .await
            .map_err(|e| SctpError::SendFailed(e.to_string()))?;
        debug!(len = data.len(), stream_id = info.stream_id, "sent");
        Ok(data.len())
    }

    /// Receive one message; returns the payload and its send-info.
    pub async fn recv(&self) -> Result<(Bytes, SendInfo), SctpError> {
        let mut half = self.read_half.lock().await;

        let mut len_buf = [0u8; 4];
        half.read_exact(&mut len_buf).await.map_err(map_read_err)?;
        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if !(FRAME_HEADER_LEN..=MAX_FRAME_LEN).contains(&frame_len) {
            return Err(SctpError::ReceiveFailed(format!(
                "bad frame length: {}",
                frame_len
            )));
        }

        let mut frame = vec![0u8; frame_len];
        half.read_exact(&mut frame).await.map_err(map_read_err)?;
        let mut buf = &frame[..];
        let stream_id = buf.get_u16();
        let ppid = buf.get_u32();
        let data = Bytes::copy_from_slice(buf);
        debug!(len = data.len(), stream_id, "received");
        Ok((data, SendInfo { ppid, stream_id }))
    }

    /// Shut down the outbound side; the peer observes an orderly EOF.
    pub async fn close(&self) -> Result<(), SctpError> {
        let mut half = self.write_half.lock().await;
        match half.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(SctpError::Io(e)),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// Listening socket producing associations.
pub struct SctpListener {
    listener: TcpListener,
    streams: StreamConfig,
    sack: SackInfo,
}

impl SctpListener {
    #[instrument(skip(streams, sack))]
    pub async fn bind(
        scheme: &str,
        local_addr: SocketAddr,
        streams: StreamConfig,
        sack: SackInfo,
    ) -> Result<Self, SctpError> {
        if !family_matches(scheme, &local_addr) {
            return Err(SctpError::InvalidScheme(scheme.to_string()));
        }
        let listener = TcpListener::bind(local_addr)
            .await
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        Ok(Self {
            listener,
            streams,
            sack,
        })
    }

    pub async fn accept(&self) -> Result<SctpAssociation, SctpError> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))?;
        debug!(%remote, "inbound association");
        SctpAssociation::accept_from(stream, self.streams, &self.sack).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SctpError> {
        self.listener
            .local_addr()
            .map_err(|e| SctpError::AssociationFailed(e.to_string()))
    }
}

/// Delayed-ACK tuning. Frequency 1 disables delayed ACK, which maps onto
/// immediate segment delivery here; the delay itself is clamped to the
/// RFC 4960 guidance of [200, 500] ms.
fn apply_sack(stream: &TcpStream, sack: &SackInfo) -> Result<(), SctpError> {
    if !sack.enabled {
        return Ok(());
    }
    let _delay = sack.delay_ms.clamp(200, 500);
    stream
        .set_nodelay(sack.frequency == 1)
        .map_err(SctpError::Io)
}

async fn send_chunk(
    stream: &mut TcpStream,
    chunk: ChunkType,
    streams: StreamConfig,
) -> Result<(), SctpError> {
    let mut frame = BytesMut::with_capacity(4 + FRAME_HEADER_LEN + 6);
    frame.put_u32((FRAME_HEADER_LEN + 6) as u32);
    frame.put_u16(CONTROL_STREAM);
    frame.put_u32(0); // no PPID on control chunks
    frame.put_u8(chunk as u8);
    frame.put_u8(0); // flags
    frame.put_u16(streams.outbound_streams);
    frame.put_u16(streams.inbound_streams);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| SctpError::Handshake(e.to_string()))
}

async fn recv_chunk(stream: &mut TcpStream) -> Result<(u8, StreamConfig), SctpError> {
    let mut buf = [0u8; 4 + FRAME_HEADER_LEN + 6];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| SctpError::Handshake(e.to_string()))?;
    let mut b = &buf[..];
    let frame_len = b.get_u32() as usize;
    if frame_len != FRAME_HEADER_LEN + 6 {
        return Err(SctpError::Handshake(format!(
            "bad negotiation frame length: {}",
            frame_len
        )));
    }
    let stream_id = b.get_u16();
    let _ppid = b.get_u32();
    if stream_id != CONTROL_STREAM {
        return Err(SctpError::Handshake(format!(
            "negotiation chunk on stream {}",
            stream_id
        )));
    }
    let chunk = b.get_u8();
    let _flags = b.get_u8();
    let peer = StreamConfig {
        outbound_streams: b.get_u16(),
        inbound_streams: b.get_u16(),
    };
    Ok((chunk, peer))
}

fn map_read_err(e: std::io::Error) -> SctpError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => SctpError::PeerClosed,
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
            SctpError::PeerReset
        }
        _ => SctpError::Io(e),
    }
}
