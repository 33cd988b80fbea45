//! Bounded blocking reads built on readiness polling.
//!
//! A read waits for `POLLIN` with the time left until an absolute deadline,
//! then takes whatever is available with a non-blocking receive. The wait is
//! repeated until the buffer is full, the peer closes, or the deadline
//! passes. The deadline is taken from the monotonic clock so system time
//! changes cannot stretch or shorten it.

use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{recv, MsgFlags};

use super::error::IpcError;
use crate::logging::LogSink;

/// Ceiling for a single bounded read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Read up to `buf.len()` bytes, waiting at most `timeout` overall.
///
/// Returns the number of bytes read. `0` means the peer closed before any
/// data arrived; a count below `buf.len()` means it closed part way through,
/// which callers must treat as a broken frame.
///
/// # Errors
///
/// - `IpcError::Timeout` if the deadline passes first
/// - `IpcError::Transport` if `poll` or `recv` fails
pub(crate) fn read_bounded(
    stream: &UnixStream,
    buf: &mut [u8],
    timeout: Duration,
    log: &dyn LogSink,
) -> Result<usize, IpcError> {
    let fd = stream.as_raw_fd();
    let deadline = Instant::now() + timeout;
    let mut done = 0;

    while done < buf.len() {
        // Recomputed on every pass: poll may return early on EINTR.
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log.warn(&format!("[fd={}] poll TIMEOUT", fd));
            return Err(IpcError::Timeout(timeout));
        }

        let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(poll_millis(remaining))) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                log.warn(&format!("[fd={}] poll ERROR: {}", fd, errno.desc()));
                return Err(errno.into());
            }
        }

        match recv(fd, &mut buf[done..], MsgFlags::MSG_DONTWAIT) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
            Err(errno) => {
                log.warn(&format!("[fd={}] read ERROR: {}", fd, errno.desc()));
                return Err(errno.into());
            }
        }
    }

    if done != 0 && done != buf.len() {
        log.warn(&format!("[fd={}] read ERROR: {}/{} bytes", fd, done, buf.len()));
    }

    Ok(done)
}

/// Poll timeout covering `remaining`, rounded up to whole milliseconds so a
/// sub-millisecond remainder does not turn into a busy loop.
fn poll_millis(remaining: Duration) -> u16 {
    let millis = remaining.as_micros().div_ceil(1000);
    u16::try_from(millis).unwrap_or(u16::MAX)
}
