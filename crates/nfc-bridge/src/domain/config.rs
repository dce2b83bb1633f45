//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It starts from [`BridgeConfig::default`], is overlaid by the optional TOML
//! file (`infrastructure::config_file`), and finally by CLI flags and
//! environment variables (`main.rs`).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) lets tests build a bridge with any
//! secret or timing without touching the process environment.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

/// Placeholder secret shipped in the default configuration.
///
/// Tags signed with it can be forged by anyone who has read this file, so
/// `main.rs` warns when it is still in use.
pub const DEFAULT_SECRET: &str = "change-me-to-a-random-secret-key";

/// Default WebSocket port.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default MIFARE Classic key A (factory transport key).
pub const DEFAULT_MIFARE_KEY: [u8; 6] = [0xFF; 6];

/// A MIFARE key string that is not exactly 12 hex digits.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("MIFARE key must be 12 hex digits, got {0:?}")]
pub struct InvalidKeyError(pub String);

/// All runtime configuration for the bridge.
///
/// Build this once at startup and hand the pieces to the components that
/// need them; nothing reads it through a global.
///
/// # Example
///
/// ```rust
/// use nfc_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8765);
/// assert!(cfg.uses_default_secret());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Shared secret for signing tag payloads.
    pub hmac_secret: String,

    /// Address the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Window in which a repeated scan (or repeated error) is suppressed.
    pub debounce: Duration,

    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,

    /// Key A for MIFARE Classic sectors 1 and 2.
    pub mifare_key: [u8; 6],

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl BridgeConfig {
    /// `true` while the placeholder secret is configured.
    pub fn uses_default_secret(&self) -> bool {
        self.hmac_secret == DEFAULT_SECRET
    }
}

impl Default for BridgeConfig {
    /// | Field         | Default                 |
    /// |---------------|-------------------------|
    /// | hmac_secret   | [`DEFAULT_SECRET`]      |
    /// | ws_bind_addr  | `127.0.0.1:8765`        |
    /// | debounce      | 3 seconds               |
    /// | poll_interval | 500 milliseconds        |
    /// | mifare_key    | `FF FF FF FF FF FF`     |
    /// | log_level     | `info`                  |
    fn default() -> Self {
        Self {
            hmac_secret: DEFAULT_SECRET.to_owned(),
            ws_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_WS_PORT)),
            debounce: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            mifare_key: DEFAULT_MIFARE_KEY,
            log_level: "info".to_owned(),
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("hmac_secret", &"<redacted>")
            .field("ws_bind_addr", &self.ws_bind_addr)
            .field("debounce", &self.debounce)
            .field("poll_interval", &self.poll_interval)
            .field("mifare_key", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Parses a MIFARE key written as 12 hex digits (`"FFFFFFFFFFFF"`).
///
/// Colons or spaces between bytes are accepted (`"FF:FF:FF:FF:FF:FF"`).
pub fn parse_mifare_key(text: &str) -> Result<[u8; 6], InvalidKeyError> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .collect();
    let mut key = [0u8; 6];
    hex::decode_to_slice(&digits, &mut key).map_err(|_| InvalidKeyError(text.to_owned()))?;
    Ok(key)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
