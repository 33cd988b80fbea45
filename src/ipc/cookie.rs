//! Cookie handshake run once right after a connection is established.
//!
//! The connecting side sends the shared cookie string as one packet and waits
//! for a one-byte acknowledgement packet. The accepting side checks the
//! cookie byte for byte and only acknowledges an exact match, so unrelated
//! clients are turned away before any request is processed.

use super::error::IpcError;
use super::framing::PacketStream;

/// Byte sent by the acceptor to confirm a valid cookie.
pub const ACK_BYTE: u8 = b'\n';

/// Initiator side: send `cookie` and wait for the acknowledgement.
///
/// # Errors
///
/// Returns the underlying framing error if the cookie cannot be written or
/// the ack cannot be read, and `IpcError::Handshake` for an empty cookie or
/// an empty ack packet.
pub fn send_cookie(stream: &mut PacketStream, cookie: &str) -> Result<(), IpcError> {
    if cookie.is_empty() {
        stream.log().warn("write cookie: empty cookie");
        return Err(IpcError::Handshake("empty cookie".to_string()));
    }

    stream
        .write_packet(cookie.as_bytes())
        .inspect_err(|e| stream.log().warn(&format!("write cookie: {}", e)))?;

    let mut ack = [0u8; 1];
    let got = stream
        .read_packet(&mut ack)
        .inspect_err(|e| stream.log().warn(&format!("read ack: {}", e)))?;
    if got != ack.len() {
        stream
            .log()
            .warn(&format!("read ack: got {} of {} bytes", got, ack.len()));
        return Err(IpcError::Handshake(format!(
            "expected 1 ack byte, got {}",
            got
        )));
    }

    Ok(())
}

/// Acceptor side: read the peer's cookie and acknowledge it if it matches
/// `cookie` exactly.
///
/// Nothing is written back on a mismatch.
///
/// # Errors
///
/// `IpcError::Handshake` if the cookie differs in length or content; framing
/// errors from reading the cookie or writing the ack are passed through.
pub fn accept_cookie(stream: &mut PacketStream, cookie: &str) -> Result<(), IpcError> {
    let expected = cookie.as_bytes();
    let mut magic = vec![0u8; expected.len()];

    let got = stream
        .read_packet(&mut magic)
        .inspect_err(|e| stream.log().warn(&format!("read cookie: {}", e)))?;
    if got != expected.len() {
        stream.log().warn(&format!(
            "read cookie: got {} of {} bytes",
            got,
            expected.len()
        ));
        return Err(IpcError::Handshake(format!(
            "cookie length {} does not match expected {}",
            got,
            expected.len()
        )));
    }
    if magic != expected {
        stream.log().warn(&format!(
            "cookie mismatch: got {}, expected {}",
            String::from_utf8_lossy(&magic),
            cookie
        ));
        return Err(IpcError::Handshake("cookie mismatch".to_string()));
    }

    stream
        .write_packet(&[ACK_BYTE])
        .inspect_err(|e| stream.log().warn(&format!("write ack: {}", e)))?;

    Ok(())
}
