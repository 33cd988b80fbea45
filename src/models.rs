//! Message envelope and system message layouts.
//!
//! Battery and charger payloads are opaque to this crate; only the common
//! 4-byte envelope and the reserved system messages (which the server
//! answers itself, independent of battery management) are modelled here.
//! All fields travel in native byte order.

use crate::ipc::IpcError;

/// Server PID request.
pub const SYSMSG_GET_PID: u16 = 0x8000;
/// Open a proxy session.
pub const SYSMSG_PROXY_OPEN: u16 = 0x8001;
/// Close a proxy session.
pub const SYSMSG_PROXY_CLOSE: u16 = 0x8002;
/// Query the proxy clock.
pub const SYSMSG_PROXY_GETTIME: u16 = 0x8003;
/// Server statistics request.
pub const SYSMSG_GET_STATS: u16 = 0x8004;

/// Largest request the server accepts in one frame.
pub const MAX_REQUEST_SIZE: usize = 512;

/// Number of 32-bit counters in a statistics reply.
pub const SERVER_STATS_WORDS: usize = 16;

/// The `{type, subtype}` prefix of every structured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageEnvelope {
    pub msg_type: u16,
    pub subtype: u16,
}

impl MessageEnvelope {
    pub const SIZE: usize = 4;

    pub const fn new(msg_type: u16, subtype: u16) -> Self {
        Self { msg_type, subtype }
    }

    /// Reserved system message with a zero subtype.
    pub const fn system(msg_type: u16) -> Self {
        Self::new(msg_type, 0)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..2].copy_from_slice(&self.msg_type.to_ne_bytes());
        out[2..].copy_from_slice(&self.subtype.to_ne_bytes());
        out
    }

    /// Decode the envelope at the start of a request payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let bytes = payload.get(..Self::SIZE)?;
        Some(Self {
            msg_type: u16::from_ne_bytes([bytes[0], bytes[1]]),
            subtype: u16::from_ne_bytes([bytes[2], bytes[3]]),
        })
    }

    /// Envelope followed by a kind-specific body.
    pub fn encode_with(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE + body.len());
        out.extend_from_slice(&self.to_bytes());
        out.extend_from_slice(body);
        out
    }

    pub fn is_system(&self) -> bool {
        self.msg_type & 0x8000 != 0
    }
}

/// Reply to [`SYSMSG_GET_PID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPidReply {
    pub zero: u32,
    pub pid: u32,
}

impl ServerPidReply {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.zero.to_ne_bytes());
        out[4..].copy_from_slice(&self.pid.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IpcError> {
        if bytes.len() != Self::SIZE {
            return Err(IpcError::ReplySize {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            zero: read_u32(&bytes[..4]),
            pid: read_u32(&bytes[4..]),
        })
    }
}

/// Reply to [`SYSMSG_GET_STATS`]: a fixed array of server counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats(pub [u32; SERVER_STATS_WORDS]);

impl ServerStats {
    pub const SIZE: usize = SERVER_STATS_WORDS * 4;

    pub fn words(&self) -> &[u32; SERVER_STATS_WORDS] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IpcError> {
        if bytes.len() != Self::SIZE {
            return Err(IpcError::ReplySize {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let mut words = [0u32; SERVER_STATS_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = read_u32(chunk);
        }
        Ok(Self(words))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
