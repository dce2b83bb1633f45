//! One poll cycle: reader → card → classify → write or read → release.
//!
//! # State machine
//!
//! Each step either ends the cycle with an event or falls through:
//!
//! ```text
//! 1. list readers      ── none / error ─────────────► NoReader
//! 2. connect + ATR     ── no card / error ──────────► NoCard
//! 3. detect chip       ── unsupported ──► reset ────► UnsupportedTag
//! 4. pending write?    ── yes ──► write ─ fail ─► reset ─► WriteResult
//! 5. read + decode     ── nothing ──► reset ────────► EmptyTag
//!                      ── verifies ─────────────────► ValidTag
//!                      ── does not verify ──────────► InvalidTag
//! ```
//!
//! From step 2 on, the card is held by a [`CardSession`] that disconnects on
//! drop, so every return path, and a panic inside the chip layer, releases
//! the card.
//!
//! The cycle is synchronous and blocks on reader I/O; `poll_loop` runs it on
//! Tokio's blocking pool.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nfc_core::chip::detect;
use nfc_core::{
    decode_user_data, reset_field, CardConnection, CardSession, PayloadCodec, ReaderDriver,
};

use crate::application::bridge_state::BridgeState;
use crate::domain::PollEvent;

/// Runs poll cycles against one reader driver.
#[derive(Debug)]
pub struct PollEngine<D: ReaderDriver> {
    driver: D,
    codec: PayloadCodec,
    state: Arc<BridgeState>,
    mifare_key: [u8; 6],
}

impl<D: ReaderDriver> PollEngine<D> {
    pub fn new(
        driver: D,
        codec: PayloadCodec,
        state: Arc<BridgeState>,
        mifare_key: [u8; 6],
    ) -> Self {
        Self {
            driver,
            codec,
            state,
            mifare_key,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    /// Runs one cycle and classifies its outcome.
    ///
    /// Never fails: every transport or chip error is folded into the event.
    pub fn poll_once(&self) -> PollEvent {
        // ── 1. Reader ─────────────────────────────────────────────────────────
        let reader = match self.driver.list_readers() {
            Ok(readers) => match readers.into_iter().next() {
                Some(reader) => reader,
                None => return PollEvent::NoReader,
            },
            Err(e) => {
                debug!("reader enumeration failed: {e}");
                return PollEvent::NoReader;
            }
        };

        // ── 2. Card ───────────────────────────────────────────────────────────
        let mut card = match self.driver.connect(&reader) {
            Ok(conn) => CardSession::new(conn),
            Err(e) => {
                debug!("no card on {reader}: {e}");
                return PollEvent::NoCard;
            }
        };
        let atr = match card.atr() {
            Ok(atr) => atr,
            Err(e) => {
                debug!("could not read ATR on {reader}: {e}");
                return PollEvent::NoCard;
            }
        };

        // ── 3. Chip ───────────────────────────────────────────────────────────
        let chip = detect(&atr);
        debug!(atr = %hex::encode(&atr), chip = %chip, "card detected");
        let Some(family) = chip.family(self.mifare_key) else {
            reset_field(&mut *card);
            return PollEvent::UnsupportedTag {
                chip_name: chip.name().to_owned(),
            };
        };

        // ── 4. Write ──────────────────────────────────────────────────────────
        if let Some(identity) = self.state.take_pending_write() {
            let payload = self.codec.encode(&identity);
            let success = match family.write(&mut *card, &payload) {
                Ok(()) => {
                    info!(chip = %chip, "wrote payload for {identity}");
                    true
                }
                Err(e) => {
                    warn!(chip = %chip, "write for {identity} failed: {e}");
                    reset_field(&mut *card);
                    false
                }
            };
            return PollEvent::WriteResult { success, identity };
        }

        // ── 5. Read ───────────────────────────────────────────────────────────
        let text = match family.read(&mut *card) {
            Ok(raw) => decode_user_data(&raw),
            Err(e) => {
                debug!(chip = %chip, "read failed: {e}");
                None
            }
        };
        let Some(text) = text else {
            reset_field(&mut *card);
            return PollEvent::EmptyTag;
        };

        match self.codec.verify(&text) {
            Ok(identity) => PollEvent::ValidTag {
                identity: identity.to_owned(),
            },
            // No field reset: the read itself succeeded.
            Err(_) => PollEvent::InvalidTag { raw: text },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
