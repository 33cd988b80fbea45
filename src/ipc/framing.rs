//! Sync-word packet framing over a Unix stream socket.
//!
//! Every packet is an 8-byte header followed by the payload. The header is
//! written in native byte order since both ends always run on the same host.
//!
//! # Wire Format
//!
//! ```text
//! +----------------+----------------+---------------------+
//! | sync: i32      | size: i32      | payload: size bytes |
//! | 0x434e5953     | >= 0           |                     |
//! +----------------+----------------+---------------------+
//! ```
//!
//! A header that is cut short, carries the wrong sync word or declares a
//! negative size is reported as end-of-stream: the byte stream can no longer
//! be split into packets, so the connection is finished.

use std::io::IoSlice;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::socket::{sendmsg, MsgFlags, UnixAddr};

use super::error::{EofReason, IpcError};
use super::reader::{read_bounded, READ_TIMEOUT};
use crate::logging::{default_sink, SharedSink};

/// Sync pattern opening every packet header ("SYNC" in little-endian ASCII).
pub const SYNC_WORD: i32 = 0x434e_5953;

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 8;

/// A closed peer must surface as `EPIPE`, not as a process-killing SIGPIPE.
#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

/// Packet header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sync: i32,
    pub size: i32,
}

impl FrameHeader {
    /// Header for a payload of `len` bytes.
    pub fn for_payload(len: usize) -> Result<Self, IpcError> {
        let size = i32::try_from(len).map_err(|_| IpcError::Oversized {
            declared: len,
            capacity: i32::MAX as usize,
        })?;
        Ok(Self {
            sync: SYNC_WORD,
            size,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.sync.to_ne_bytes());
        out[4..].copy_from_slice(&self.size.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            sync: i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            size: i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// A Unix stream socket that sends and receives whole packets.
///
/// Packets must be exchanged strictly in turn; the `&mut self` receivers
/// keep two frames from being interleaved on the same socket.
pub struct PacketStream {
    stream: UnixStream,
    log: SharedSink,
    read_timeout: Duration,
}

impl PacketStream {
    /// Wrap a connected socket, logging through `tracing`.
    pub fn new(stream: UnixStream) -> Self {
        Self::with_logger(stream, default_sink())
    }

    pub fn with_logger(stream: UnixStream, log: SharedSink) -> Self {
        Self {
            stream,
            log,
            read_timeout: READ_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn get_ref(&self) -> &UnixStream {
        &self.stream
    }

    pub fn into_inner(self) -> UnixStream {
        self.stream
    }

    pub(crate) fn log(&self) -> &SharedSink {
        &self.log
    }

    fn fd(&self) -> i32 {
        self.stream.as_raw_fd()
    }

    /// Write one packet with a single vectored `sendmsg`.
    ///
    /// On Linux the send never raises SIGPIPE, so a vanished peer is reported
    /// as `Transport(EPIPE)` whatever the host's signal disposition.
    ///
    /// Returns the payload length (header excluded).
    ///
    /// # Errors
    ///
    /// - `IpcError::Transport` if the write fails
    /// - `IpcError::Transport` with `ECOMM` if only part of the packet went out
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<usize, IpcError> {
        let header = FrameHeader::for_payload(payload.len())?.to_bytes();
        let total = HEADER_SIZE + payload.len();
        let iov = [IoSlice::new(&header), IoSlice::new(payload)];

        let written = loop {
            match sendmsg::<UnixAddr>(self.fd(), &iov, &[], SEND_FLAGS, None) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    self.log
                        .warn(&format!("[fd={}] write ERROR: {}", self.fd(), e.desc()));
                    return Err(IpcError::from(e));
                }
            }
        };

        if written != total {
            self.log.warn(&format!(
                "[fd={}] write ERROR: {}/{} bytes",
                self.fd(),
                written,
                total
            ));
            return Err(IpcError::short_write());
        }

        Ok(payload.len())
    }

    /// Read one packet into `buf`.
    ///
    /// Returns the payload length, which may be less than `buf.len()`; bytes
    /// past it are left untouched.
    ///
    /// # Errors
    ///
    /// - `IpcError::Eof` on disconnect, truncated header or lost sync
    /// - `IpcError::Oversized` if the payload does not fit in `buf`
    /// - `IpcError::ShortPayload` if the payload ends early
    /// - `IpcError::Timeout` / `IpcError::Transport` from the underlying read
    pub fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, IpcError> {
        let size = self.read_header()?;

        if size > buf.len() {
            self.log.warn(&format!(
                "[fd={}] read packet: got {}, expected max {} bytes",
                self.fd(),
                size,
                buf.len()
            ));
            return Err(IpcError::Oversized {
                declared: size,
                capacity: buf.len(),
            });
        }
        if size == 0 {
            return Ok(0);
        }

        let body = &mut buf[..size];
        let got = read_bounded(&self.stream, body, self.read_timeout, &*self.log)
            .inspect_err(|e| {
                self.log
                    .warn(&format!("[fd={}] read packet: {}", self.fd(), e));
            })?;

        if got != size {
            self.log.warn(&format!(
                "[fd={}] read packet: got {}/{} bytes",
                self.fd(),
                got,
                size
            ));
            return Err(IpcError::ShortPayload {
                expected: size,
                actual: got,
            });
        }

        Ok(got)
    }

    /// Read and validate a header, returning the declared payload size.
    fn read_header(&mut self) -> Result<usize, IpcError> {
        let mut raw = [0u8; HEADER_SIZE];
        let got = read_bounded(&self.stream, &mut raw, self.read_timeout, &*self.log)
            .inspect_err(|e| {
                self.log
                    .warn(&format!("[fd={}] read header: {}", self.fd(), e));
            })?;

        if got == 0 {
            return Err(IpcError::Eof(EofReason::Closed));
        }
        if got != HEADER_SIZE {
            self.log.warn(&format!(
                "[fd={}] read header: got {} / {} bytes",
                self.fd(),
                got,
                HEADER_SIZE
            ));
            return Err(IpcError::Eof(EofReason::TruncatedHeader { got }));
        }

        let header = FrameHeader::from_bytes(&raw);
        if header.sync != SYNC_WORD {
            self.log
                .warn(&format!("[fd={}] read header: out of sync", self.fd()));
            return Err(IpcError::Eof(EofReason::OutOfSync { sync: header.sync }));
        }
        if header.size < 0 {
            self.log
                .warn(&format!("[fd={}] read header: negative size", self.fd()));
            return Err(IpcError::Eof(EofReason::NegativeSize { size: header.size }));
        }

        Ok(header.size as usize)
    }
}

impl std::fmt::Debug for PacketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("fd", &self.fd())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::error::ErrorKind;
    use crate::logging::testing::CapturingSink;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Instant;

    /// Test timeout to keep failing reads short.
    const TEST_TIMEOUT: Duration = Duration::from_millis(300);

    /// Connected pair: a packet stream under test and the raw peer socket.
    fn packet_pair() -> (PacketStream, UnixStream, std::sync::Arc<CapturingSink>) {
        let (local, peer) = UnixStream::pair().expect("Failed to create socket pair");
        let log = CapturingSink::new();
        let mut stream = PacketStream::with_logger(local, log.clone());
        stream.set_read_timeout(TEST_TIMEOUT);
        (stream, peer, log)
    }

    fn raw_frame(sync: i32, size: i32, payload: &[u8]) -> Vec<u8> {
        let mut out = FrameHeader { sync, size }.to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_header_layout_is_native_endian() {
        let header = FrameHeader::for_payload(12).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], &SYNC_WORD.to_ne_bytes());
        assert_eq!(&bytes[4..], &12i32.to_ne_bytes());
        assert_eq!(FrameHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (local, peer) = UnixStream::pair().expect("Failed to create socket pair");
        let mut writer = PacketStream::new(local);
        let mut reader = PacketStream::new(peer);

        for n in [0usize, 1, 7, 8, 512, 4096] {
            let payload: Vec<u8> = (0..n).map(|i| (i * 31 % 251) as u8).collect();
            assert_eq!(writer.write_packet(&payload).expect("Write failed"), n);

            let mut buf = vec![0u8; n + 16];
            let got = reader.read_packet(&mut buf).expect("Read failed");
            assert_eq!(got, n);
            assert_eq!(&buf[..got], &payload[..]);
        }
    }

    #[test]
    fn test_write_emits_header_then_payload() {
        let (mut stream, peer, _log) = packet_pair();
        stream.write_packet(b"BMentity").unwrap();

        let mut raw = [0u8; HEADER_SIZE + 8];
        let got = read_bounded(&peer, &mut raw, TEST_TIMEOUT, &crate::logging::NullSink).unwrap();
        assert_eq!(got, raw.len());
        assert_eq!(raw.to_vec(), raw_frame(SYNC_WORD, 8, b"BMentity"));
    }

    #[test]
    fn test_smaller_payload_leaves_rest_of_buffer() {
        let (mut stream, mut peer, _log) = packet_pair();
        peer.write_all(&raw_frame(SYNC_WORD, 3, b"abc")).unwrap();

        let mut buf = [0xEEu8; 8];
        assert_eq!(stream.read_packet(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc\xEE\xEE\xEE\xEE\xEE");
    }

    #[test]
    fn test_read_rejects_oversized_message() {
        let (mut stream, mut peer, log) = packet_pair();
        peer.write_all(&raw_frame(SYNC_WORD, 16, &[7u8; 16])).unwrap();

        let mut buf = [0u8; 8];
        let err = stream.read_packet(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            IpcError::Oversized {
                declared: 16,
                capacity: 8
            }
        ));
        assert_eq!(err.kind(), ErrorKind::BadMessage);
        assert_eq!(buf, [0u8; 8], "Buffer must not be partially filled");
        assert!(log.contains("expected max 8 bytes"));
    }

    #[test]
    fn test_any_sync_bit_flip_is_desync() {
        for bit in 0..32 {
            let (mut stream, mut peer, _log) = packet_pair();
            let corrupted = SYNC_WORD ^ (1 << bit);
            peer.write_all(&raw_frame(corrupted, 4, b"data")).unwrap();

            let mut buf = [0u8; 4];
            let err = stream.read_packet(&mut buf).unwrap_err();
            assert!(
                matches!(err, IpcError::Eof(EofReason::OutOfSync { sync }) if sync == corrupted),
                "bit {} not detected: {:?}",
                bit,
                err
            );
        }
    }

    #[test]
    fn test_negative_size_is_eof() {
        let (mut stream, mut peer, log) = packet_pair();
        peer.write_all(&raw_frame(SYNC_WORD, -1, b"")).unwrap();

        let err = stream.read_packet(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            IpcError::Eof(EofReason::NegativeSize { size: -1 })
        ));
        assert!(log.contains("negative size"));
    }

    #[test]
    fn test_truncated_header_is_eof() {
        let (mut stream, mut peer, _log) = packet_pair();
        peer.write_all(&SYNC_WORD.to_ne_bytes()).unwrap();
        drop(peer);

        let err = stream.read_packet(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            IpcError::Eof(EofReason::TruncatedHeader { got: 4 })
        ));
    }

    #[test]
    fn test_connection_closed_is_quiet_eof() {
        let (mut stream, peer, log) = packet_pair();
        drop(peer);

        let err = stream.read_packet(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(err, IpcError::Eof(EofReason::Closed)));
        assert!(log.messages().is_empty(), "Clean EOF must not be logged");
    }

    #[test]
    fn test_short_payload_is_bad_message() {
        let (mut stream, mut peer, _log) = packet_pair();
        peer.write_all(&raw_frame(SYNC_WORD, 10, b"abcd")).unwrap();
        drop(peer);

        let err = stream.read_packet(&mut [0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            IpcError::ShortPayload {
                expected: 10,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_payload_timeout_passes_through() {
        let (mut stream, mut peer, _log) = packet_pair();
        peer.write_all(&raw_frame(SYNC_WORD, 10, b"abcd")).unwrap();

        let err = stream.read_packet(&mut [0u8; 16]).unwrap_err();
        assert!(matches!(err, IpcError::Timeout(_)));
    }

    #[test]
    fn test_write_to_closed_peer_is_transport_error() {
        let (mut stream, peer, log) = packet_pair();
        drop(peer);

        let err = stream.write_packet(b"hello").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.raw_os_error(), Some(Errno::EPIPE as i32));
        assert!(log.contains("write ERROR"));
    }

    #[test]
    fn test_read_times_out_after_default_ceiling() {
        let (local, _peer) = UnixStream::pair().expect("Failed to create socket pair");
        let mut stream = PacketStream::new(local);

        let start = Instant::now();
        let err = stream.read_packet(&mut [0u8; 4]).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, IpcError::Timeout(t) if t == READ_TIMEOUT));
        assert!(elapsed >= READ_TIMEOUT, "Timed out early: {:?}", elapsed);
        assert!(
            elapsed < READ_TIMEOUT + Duration::from_secs(2),
            "Timed out late: {:?}",
            elapsed
        );
    }
}
