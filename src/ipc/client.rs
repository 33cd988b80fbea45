//! Connection management for the BME server.
//!
//! Two deployment shapes share the same protocol:
//!
//! - [`Connection`] is an explicit handle. Open as many as needed and pass
//!   the one to use to every call.
//! - [`ConnectionSlot`] holds at most one connection, for applications that
//!   want a single connection with an explicit open/close lifecycle. Opening
//!   a second connection while one is active is refused.

use std::fmt;
use std::net::Shutdown;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::unistd::close;

use super::cookie::send_cookie;
use super::error::IpcError;
use super::framing::PacketStream;
use crate::config::IpcConfig;
use crate::logging::{default_sink, LogSink, SharedSink};

/// One established, authenticated connection to the BME server.
///
/// Calls take `&mut self`: the protocol has no request pipelining, so each
/// exchange must finish before the next starts. Share a connection between
/// threads only behind a mutex held for the whole call.
#[derive(Debug)]
pub struct Connection {
    stream: PacketStream,
}

impl Connection {
    /// Connect to the server described by `config` and run the handshake.
    ///
    /// # Errors
    ///
    /// - `IpcError::Transport` if the socket cannot be connected
    /// - any handshake error (see [`send_cookie`])
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut conn = Connection::connect(&IpcConfig::default())?;
    /// let pid = conn.get_server_pid()?;
    /// conn.close();
    /// ```
    pub fn connect(config: &IpcConfig) -> Result<Self, IpcError> {
        Self::connect_with_logger(config, default_sink())
    }

    /// Like [`Connection::connect`], reporting diagnostics to `log`.
    pub fn connect_with_logger(config: &IpcConfig, log: SharedSink) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(&config.socket_path)?;
        Self::establish(stream, &config.cookie, log)
    }

    /// Run the initiator handshake over an already connected socket.
    ///
    /// The socket is closed if the handshake fails.
    pub fn establish(stream: UnixStream, cookie: &str, log: SharedSink) -> Result<Self, IpcError> {
        let mut stream = PacketStream::with_logger(stream, log);
        send_cookie(&mut stream, cookie)?;
        Ok(Self { stream })
    }

    /// Send one raw packet.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<usize, IpcError> {
        self.stream.write_packet(payload)
    }

    /// Receive one raw packet into `buf`.
    pub fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, IpcError> {
        self.stream.read_packet(buf)
    }

    pub fn socket(&self) -> &UnixStream {
        self.stream.get_ref()
    }

    pub(crate) fn log(&self) -> &SharedSink {
        self.stream.log()
    }

    /// Shut the connection down and close the socket. Failures are logged,
    /// never returned.
    pub fn close(self) {
        let log = self.stream.log().clone();
        let stream = self.stream.into_inner();
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                log.warn(&format!("close: shutdown: {}", e));
            }
        }
        close_fd(stream.into_raw_fd(), &*log);
    }
}

fn close_fd(fd: RawFd, log: &dyn LogSink) {
    if let Err(e) = close(fd) {
        log.warn(&format!("[fd={}] close ERROR: {}", fd, e.desc()));
    }
}

/// Holder for the single active connection of an application.
///
/// Lifecycle: empty → connected on [`ConnectionSlot::connect`] → empty on
/// [`ConnectionSlot::disconnect`].
pub struct ConnectionSlot {
    config: IpcConfig,
    log: SharedSink,
    active: Option<Connection>,
}

impl ConnectionSlot {
    pub fn new(config: IpcConfig) -> Self {
        Self::with_logger(config, default_sink())
    }

    pub fn with_logger(config: IpcConfig, log: SharedSink) -> Self {
        Self {
            config,
            log,
            active: None,
        }
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// `IpcError::AlreadyConnected` if a connection is already active; the
    /// active connection is left untouched. Otherwise any error from
    /// [`Connection::connect`], after which the slot stays empty.
    pub fn connect(&mut self) -> Result<&mut Connection, IpcError> {
        if self.active.is_some() {
            self.log.error("connect: already connected");
            return Err(IpcError::AlreadyConnected);
        }
        let conn = Connection::connect_with_logger(&self.config, self.log.clone())?;
        Ok(self.active.insert(conn))
    }

    /// Close the active connection, if any. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.active.take() {
            conn.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.active.as_ref()
    }

    /// The active connection, or `IpcError::NotConnected`.
    pub fn connection_mut(&mut self) -> Result<&mut Connection, IpcError> {
        self.active.as_mut().ok_or(IpcError::NotConnected)
    }

    pub fn write_packet(&mut self, payload: &[u8]) -> Result<usize, IpcError> {
        self.connection_mut()?.write_packet(payload)
    }

    pub fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, IpcError> {
        self.connection_mut()?.read_packet(buf)
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new(IpcConfig::default())
    }
}

impl fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("config", &self.config)
            .field("active", &self.active)
            .finish()
    }
}
