//! NFC bridge: entry point.
//!
//! Polls the first PC/SC reader, verifies signed student tags, programs new
//! tags on request, and reports everything to browser clients over
//! WebSocket.
//!
//! # Usage
//!
//! ```text
//! nfc-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file
//!   --ws-host <HOST>           WebSocket bind host [default: localhost]
//!   --ws-port <PORT>           WebSocket port [default: 8765]
//!   --secret <SECRET>          HMAC secret for tag payloads
//!   --debounce-secs <SECS>     Repeat-scan suppression window [default: 3]
//!   --poll-interval-ms <MS>    Delay between poll cycles [default: 500]
//!   --mifare-key <HEX>         MIFARE Classic key A [default: FFFFFFFFFFFF]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults < config file < environment variables < CLI flags.
//!
//! | Variable                 | Flag                 |
//! |--------------------------|----------------------|
//! | `NFC_BRIDGE_CONFIG`      | `--config`           |
//! | `NFC_BRIDGE_WS_HOST`     | `--ws-host`          |
//! | `NFC_BRIDGE_WS_PORT`     | `--ws-port`          |
//! | `NFC_BRIDGE_SECRET`      | `--secret`           |
//! | `NFC_BRIDGE_DEBOUNCE`    | `--debounce-secs`    |
//! | `NFC_BRIDGE_POLL_MS`     | `--poll-interval-ms` |
//! | `NFC_BRIDGE_MIFARE_KEY`  | `--mifare-key`       |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nfc_bridge::application::{BridgeState, PollEngine};
use nfc_bridge::domain::{parse_mifare_key, BridgeConfig};
use nfc_bridge::infrastructure::config_file::resolve_bind_addr;
use nfc_bridge::infrastructure::{bind, run_poll_loop, run_server, FileConfig, PcscDriver};
use nfc_core::PayloadCodec;

/// Notifications buffered per browser before the slowest one starts losing
/// the oldest.
const EVENT_CAPACITY: usize = 64;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// NFC reader to WebSocket bridge.
///
/// Every option is optional; anything not given falls back to the config
/// file and then to the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "nfc-bridge",
    about = "Bridges a PC/SC contactless reader to browser clients over WebSocket",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "NFC_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind the WebSocket server to (`localhost` or an IP address).
    #[arg(long, env = "NFC_BRIDGE_WS_HOST")]
    ws_host: Option<String>,

    /// WebSocket server port.
    #[arg(long, env = "NFC_BRIDGE_WS_PORT")]
    ws_port: Option<u16>,

    /// Shared secret used to sign and verify tag payloads.
    #[arg(long, env = "NFC_BRIDGE_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Seconds during which a repeated scan of the same tag is suppressed.
    #[arg(long, env = "NFC_BRIDGE_DEBOUNCE")]
    debounce_secs: Option<u64>,

    /// Milliseconds between poll cycles.
    #[arg(long, env = "NFC_BRIDGE_POLL_MS")]
    poll_interval_ms: Option<u64>,

    /// MIFARE Classic key A as 12 hex digits.
    #[arg(long, env = "NFC_BRIDGE_MIFARE_KEY", hide_env_values = true)]
    mifare_key: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// address or key is malformed.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        // Host and port are resolved together so a lone --ws-port keeps the
        // file's host.
        let host = self.ws_host.unwrap_or_else(|| file.websocket.host.clone());
        let port = self.ws_port.unwrap_or(file.websocket.port);

        let mut config = file.into_bridge_config()?;
        config.ws_bind_addr = resolve_bind_addr(&host, port)?;

        if let Some(secret) = self.secret {
            config.hmac_secret = secret;
        }
        if let Some(secs) = self.debounce_secs {
            config.debounce = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(key) = self.mifare_key {
            config.mifare_key = parse_mifare_key(&key)?;
        }

        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_bridge_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "NFC bridge starting: ws={}, poll={}ms, debounce={}s",
        config.ws_bind_addr,
        config.poll_interval.as_millis(),
        config.debounce.as_secs()
    );
    if config.uses_default_secret() {
        warn!(
            "using the built-in HMAC secret; anyone can forge tags. \
             Set --secret or NFC_BRIDGE_SECRET"
        );
    }

    let codec = PayloadCodec::new(config.hmac_secret.as_bytes()).context("invalid HMAC secret")?;
    let state = Arc::new(BridgeState::new(config.debounce));
    let engine = Arc::new(PollEngine::new(
        PcscDriver::new(),
        codec,
        Arc::clone(&state),
        config.mifare_key,
    ));
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let listener = bind(config.ws_bind_addr).await?;
    let poller = tokio::spawn(run_poll_loop(
        engine,
        events.clone(),
        config.poll_interval,
        Arc::clone(&running),
    ));

    run_server(listener, state, events, running).await?;

    if let Err(e) = poller.await {
        error!("poll loop task failed: {e}");
    }

    info!("NFC bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
