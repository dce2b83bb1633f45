//! Event loop: runs poll cycles and broadcasts what they observed.
//!
//! The cycle talks to the reader synchronously, so each one runs on Tokio's
//! blocking pool.  The loop awaits it before sleeping and starting the next,
//! so exactly one cycle is ever in flight.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use nfc_core::ReaderDriver;

use crate::application::{EventDispatcher, PollEngine};
use crate::domain::ServerMsg;

/// Polls until `running` is set to `false`.
///
/// A cycle that panics is logged and the loop carries on after the normal
/// delay; the panic never reaches the caller.
pub async fn run_poll_loop<D>(
    engine: Arc<PollEngine<D>>,
    events: broadcast::Sender<ServerMsg>,
    interval: Duration,
    running: Arc<AtomicBool>,
) where
    D: ReaderDriver + Send + Sync + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    info!("poll loop started ({}ms interval)", interval.as_millis());

    while running.load(Ordering::Relaxed) {
        let cycle = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || cycle.poll_once()).await {
            Ok(event) => {
                for msg in dispatcher.handle(&event, engine.state()) {
                    // No subscribers is not an error: nobody is listening yet.
                    if events.send(msg).is_err() {
                        debug!("no browsers connected; notification dropped");
                    }
                }
            }
            Err(e) => error!("poll cycle failed: {e}"),
        }

        tokio::time::sleep(interval).await;
    }

    info!("poll loop stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
