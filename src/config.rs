//! Connection settings for the BME server.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Well-known path of the BME server socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/.bmesrv";

/// Cookie exchanged during the connect handshake.
pub const DEFAULT_COOKIE: &str = "BMentity";

/// Environment variable overriding the socket path.
pub const SOCKET_PATH_ENV: &str = "BME_SOCKET_PATH";

/// Environment variable overriding the handshake cookie.
pub const COOKIE_ENV: &str = "BME_COOKIE";

/// Where to connect and how to authenticate.
///
/// Missing fields fall back to the defaults when deserialized, so the struct
/// can be embedded in a larger application config:
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct AppConfig {
///     #[serde(default)]
///     bme: IpcConfig,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub cookie: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            cookie: DEFAULT_COOKIE.to_string(),
        }
    }
}

impl IpcConfig {
    /// Defaults, with `BME_SOCKET_PATH` and `BME_COOKIE` applied on top.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Defaults, overridden by whatever `lookup` returns for the two
    /// environment variable names. Empty values are ignored.
    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(SOCKET_PATH_ENV).filter(|p| !p.is_empty()) {
            tracing::debug!("Using BME socket from {}: {:?}", SOCKET_PATH_ENV, path);
            config.socket_path = PathBuf::from(path);
        }
        match lookup(COOKIE_ENV).map(OsString::into_string) {
            Some(Ok(cookie)) if !cookie.is_empty() => config.cookie = cookie,
            Some(Err(raw)) => tracing::warn!("Ignoring non UTF-8 {}: {:?}", COOKIE_ENV, raw),
            _ => {}
        }
        config
    }

    pub fn with_socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }
}
