//! Diagnostic log sink used by the IPC layer.
//!
//! Every abnormal path in the protocol (timeouts, short reads, sync loss,
//! handshake failures) is reported through a [`LogSink`] at the point of
//! detection. The sink is injected when a connection is built; by default
//! messages are forwarded to [`tracing`] so the embedding application decides
//! where they end up by installing a subscriber.
//!
//! ```ignore
//! use std::sync::Arc;
//! use bme_ipc::logging::Severity;
//!
//! let sink = Arc::new(|level: Severity, msg: &str| eprintln!("[{}] {}", level, msg));
//! let conn = Connection::connect_with_logger(&config, sink)?;
//! ```

use std::fmt;
use std::sync::Arc;

/// Severity of a diagnostic message, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for diagnostic messages.
///
/// Implementations must not fail; logging never changes the outcome of the
/// operation that produced the message.
pub trait LogSink {
    /// Emit one formatted message.
    fn emit(&self, severity: Severity, message: &str);

    fn warn(&self, message: &str) {
        self.emit(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.emit(Severity::Error, message);
    }
}

/// Shared handle to a sink, cheap to clone into every connection.
pub type SharedSink = Arc<dyn LogSink + Send + Sync>;

/// Plain functions and closures can be used directly as sinks.
impl<F> LogSink for F
where
    F: Fn(Severity, &str),
{
    fn emit(&self, severity: Severity, message: &str) {
        self(severity, message)
    }
}

/// Forwards messages to the `tracing` facade under the `bme_ipc` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => tracing::error!(target: "bme_ipc", "{}", message),
            Severity::Warning => tracing::warn!(target: "bme_ipc", "{}", message),
            Severity::Info => tracing::info!(target: "bme_ipc", "{}", message),
            Severity::Debug => tracing::debug!(target: "bme_ipc", "{}", message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _severity: Severity, _message: &str) {}
}

/// The sink used when none is supplied.
pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every message for later inspection.
    #[derive(Default)]
    pub struct CapturingSink {
        pub entries: Mutex<Vec<(Severity, String)>>,
    }

    impl CapturingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn messages(&self) -> Vec<(Severity, String)> {
            self.entries.lock().unwrap().clone()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.messages().iter().any(|(_, m)| m.contains(needle))
        }
    }

    impl LogSink for CapturingSink {
        fn emit(&self, severity: Severity, message: &str) {
            self.entries
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }
}
