//! # M3UA endpoint
//!
//! RFC 4666 MTP3 User Adaptation Layer over a multi-streamed transport:
//!
//! - **Codec** - common header + TLV parameters, including Protocol Data
//! - **State machine** - the ASPSM/ASPTM lifecycle for ASP and SGP roles
//! - **Heartbeat** - challenge/response liveness with timer-based expiry
//! - **Association runtime** - reader, dispatcher, monitor and teardown
//!
//! ## Example
//! ```rust,ignore
//! use m3ua::{connect, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! let cfg = Config::new(0x11111111, 0x22222222, 3, 0, 0, 1);
//! let conn = connect("m3ua", None, "127.0.0.1:2905".parse()?, cfg,
//!     CancellationToken::new()).await?;
//! conn.write_payload(b"...sccp...", None).await?;
//! ```

pub mod client;
pub mod config;
pub mod conn;
pub mod errors;
pub mod fsm;
mod heartbeat;
pub mod messages;
pub mod sctp;
pub mod server;
pub mod types;

// Re-exports
pub use client::connect;
pub use config::{Config, HeartbeatInfo, SackInfo};
pub use conn::Conn;
pub use errors::{CodecError, Error, Result, SctpError};
pub use fsm::{AspState, Role};
pub use messages::{params::Param, params::ProtocolData, Message};
pub use server::Listener;
pub use types::TrafficModeType;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default SCTP port for M3UA.
pub const DEFAULT_M3UA_PORT: u16 = 2905;
