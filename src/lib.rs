//! BME IPC Library
//!
//! Client-side library for talking to the battery management entity (BME)
//! daemon over its local domain socket:
//!
//! - `ipc` - framed messaging protocol, connection management and RPC
//! - `models` - message envelope and system message layouts
//! - `config` - socket path and handshake cookie
//! - `logging` - injectable diagnostic sink
//!
//! # Example
//!
//! ```ignore
//! use bme_ipc::{ConnectionSlot, IpcConfig};
//!
//! let mut slot = ConnectionSlot::new(IpcConfig::default());
//! slot.connect()?;
//! println!("BME server pid {}", slot.get_server_pid()?);
//! slot.disconnect();
//! ```

pub mod config;
pub mod ipc;
pub mod logging;
pub mod models;

pub use config::IpcConfig;
pub use ipc::{Connection, ConnectionSlot, IpcError};
