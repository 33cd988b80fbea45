//! Request/reply exchange on top of packet framing.
//!
//! One call is a request packet from the client, a 4-byte status packet from
//! the server and, when the status is non-negative and the caller asked for
//! one, a reply packet:
//!
//! ```text
//! client                      server
//!   | -- request packet ------> |
//!   | <----- status (i32) ----- |
//!   | <----- reply packet ----- |   only if status >= 0 and a reply is wanted
//! ```
//!
//! There is no drain step: on a negative status, or when no reply buffer is
//! supplied, the server sends nothing after the status.

use super::client::{Connection, ConnectionSlot};
use super::error::IpcError;
use crate::models::{
    MessageEnvelope, ServerPidReply, ServerStats, SYSMSG_GET_PID, SYSMSG_GET_STATS,
};

/// Size of the status word that answers every request.
const STATUS_SIZE: usize = 4;

/// Result of one request/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcReply {
    /// Status set by the server; negative means the request failed.
    pub status: i32,
    /// Bytes placed in the reply buffer, if a reply was read.
    pub reply_len: Option<usize>,
}

impl RpcReply {
    pub fn is_success(&self) -> bool {
        self.status >= 0
    }
}

impl Connection {
    /// Send `request` and collect the server's status and optional reply.
    ///
    /// The reply is only read when the status is non-negative and `reply` is
    /// a non-empty buffer. The call is all-or-nothing: if the reply read
    /// fails, the error is returned and the status is discarded.
    ///
    /// # Errors
    ///
    /// Any framing error from writing the request, reading the status or
    /// reading the reply; `IpcError::StatusSize` if the status packet is not
    /// exactly 4 bytes.
    pub fn send_and_receive(
        &mut self,
        request: &[u8],
        reply: Option<&mut [u8]>,
    ) -> Result<RpcReply, IpcError> {
        self.write_packet(request)?;

        let mut raw = [0u8; STATUS_SIZE];
        let got = self.read_packet(&mut raw)?;
        if got != STATUS_SIZE {
            self.log()
                .warn(&format!("read status: got {} of {} bytes", got, STATUS_SIZE));
            return Err(IpcError::StatusSize { actual: got });
        }
        let status = i32::from_ne_bytes(raw);

        let reply_len = match reply {
            Some(buf) if status >= 0 && !buf.is_empty() => Some(self.read_packet(buf)?),
            _ => None,
        };

        Ok(RpcReply { status, reply_len })
    }

    /// Send a structured message: `envelope` followed by `body`.
    pub fn call(
        &mut self,
        envelope: MessageEnvelope,
        body: &[u8],
        reply: Option<&mut [u8]>,
    ) -> Result<RpcReply, IpcError> {
        self.send_and_receive(&envelope.encode_with(body), reply)
    }

    /// Process ID of the BME server.
    pub fn get_server_pid(&mut self) -> Result<u32, IpcError> {
        let mut reply = [0u8; ServerPidReply::SIZE];
        let outcome = self.call(
            MessageEnvelope::system(SYSMSG_GET_PID),
            &[],
            Some(&mut reply[..]),
        )?;
        let len = successful_reply_len(&outcome)?;
        Ok(ServerPidReply::from_bytes(&reply[..len])?.pid)
    }

    /// Server counters. The reply must be exactly [`ServerStats::SIZE`] bytes.
    pub fn get_server_stats(&mut self) -> Result<ServerStats, IpcError> {
        let mut reply = [0u8; ServerStats::SIZE];
        let outcome = self.call(
            MessageEnvelope::system(SYSMSG_GET_STATS),
            &[],
            Some(&mut reply[..]),
        )?;
        let len = successful_reply_len(&outcome)?;
        ServerStats::from_bytes(&reply[..len])
    }
}

fn successful_reply_len(outcome: &RpcReply) -> Result<usize, IpcError> {
    if !outcome.is_success() {
        return Err(IpcError::ServerStatus(outcome.status));
    }
    Ok(outcome.reply_len.unwrap_or(0))
}

impl ConnectionSlot {
    pub fn send_and_receive(
        &mut self,
        request: &[u8],
        reply: Option<&mut [u8]>,
    ) -> Result<RpcReply, IpcError> {
        self.connection_mut()?.send_and_receive(request, reply)
    }

    pub fn call(
        &mut self,
        envelope: MessageEnvelope,
        body: &[u8],
        reply: Option<&mut [u8]>,
    ) -> Result<RpcReply, IpcError> {
        self.connection_mut()?.call(envelope, body, reply)
    }

    pub fn get_server_pid(&mut self) -> Result<u32, IpcError> {
        self.connection_mut()?.get_server_pid()
    }

    pub fn get_server_stats(&mut self) -> Result<ServerStats, IpcError> {
        self.connection_mut()?.get_server_stats()
    }
}
