//! Optional TOML configuration file.
//!
//! Every field may be omitted; missing fields take the built-in defaults.
//!
//! ```toml
//! hmac_secret = "a-long-random-string"
//! log_level = "info"
//!
//! [websocket]
//! host = "localhost"
//! port = 8765
//!
//! [reader]
//! debounce_secs = 3
//! poll_interval_ms = 500
//! mifare_key = "FFFFFFFFFFFF"
//! ```
//!
//! CLI flags and environment variables are applied on top of the result in
//! `main.rs`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    parse_mifare_key, BridgeConfig, InvalidKeyError, DEFAULT_SECRET, DEFAULT_WS_PORT,
};

/// Error type for loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyError),

    /// The WebSocket host is neither `localhost` nor an IP address.
    #[error("invalid WebSocket host {0:?}: expected \"localhost\" or an IP address")]
    InvalidHost(String),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// On-disk configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    /// Shared secret for signing tag payloads.
    #[serde(default = "default_secret")]
    pub hmac_secret: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub websocket: WebSocketSection,
    #[serde(default)]
    pub reader: ReaderSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSocketSection {
    /// `"localhost"` or an IP address.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReaderSection {
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Key A as 12 hex digits.
    #[serde(default = "default_mifare_key")]
    pub mifare_key: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    DEFAULT_WS_PORT
}
fn default_debounce_secs() -> u64 {
    3
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_mifare_key() -> String {
    "FFFFFFFFFFFF".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            hmac_secret: default_secret(),
            log_level: default_log_level(),
            websocket: WebSocketSection::default(),
            reader: ReaderSection::default(),
        }
    }
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            mifare_key: default_mifare_key(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FileConfig {
    /// Reads and parses the file at `path`.
    ///
    /// Unlike a missing field, a missing file is an error: the path was given
    /// explicitly.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the file's values and converts them to a [`BridgeConfig`].
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        Ok(BridgeConfig {
            hmac_secret: self.hmac_secret,
            ws_bind_addr: resolve_bind_addr(&self.websocket.host, self.websocket.port)?,
            debounce: Duration::from_secs(self.reader.debounce_secs),
            poll_interval: Duration::from_millis(self.reader.poll_interval_ms),
            mifare_key: parse_mifare_key(&self.reader.mifare_key)?,
            log_level: self.log_level,
        })
    }
}

/// Resolves a bind host.  `localhost` means the IPv4 loopback address;
/// anything else must be a literal IP address.
pub fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip = if host.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse()
            .map_err(|_| ConfigError::InvalidHost(host.to_owned()))?
    };
    Ok(SocketAddr::new(ip, port))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
