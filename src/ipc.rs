//! IPC client for communication with the BME server.
//!
//! This module implements the framed protocol spoken over the server's Unix
//! domain socket: a cookie handshake right after connecting, sync-word packet
//! framing, bounded-timeout reads and a request/status/reply exchange.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐          Unix Socket          ┌─────────────────────┐
//! │   Application   │  ◄──────────────────────────► │     BME server      │
//! │  (Connection)   │   cookie handshake + packets  │    (/tmp/.bmesrv)   │
//! └─────────────────┘                               └─────────────────────┘
//! ```
//!
//! Layers, bottom up:
//!
//! - `reader` - poll-bounded reads (5 second ceiling)
//! - `framing` - 8-byte `{sync, size}` header around every payload
//! - `cookie` - handshake, both initiator and acceptor roles
//! - `client` - connection lifecycle, explicit handle or single slot
//! - `rpc` - request, status word, optional reply; typed system calls
//!
//! # Usage
//!
//! ```ignore
//! use bme_ipc::config::IpcConfig;
//! use bme_ipc::ipc::Connection;
//!
//! let mut conn = Connection::connect(&IpcConfig::from_env())?;
//! let pid = conn.get_server_pid()?;
//! conn.close();
//! ```

mod client;
mod cookie;
mod error;
mod framing;
mod reader;
mod rpc;

pub use client::{Connection, ConnectionSlot};
pub use cookie::{accept_cookie, send_cookie, ACK_BYTE};
pub use error::{EofReason, ErrorKind, IpcError};
pub use framing::{FrameHeader, PacketStream, HEADER_SIZE, SYNC_WORD};
pub use reader::READ_TIMEOUT;
pub use rpc::RpcReply;
