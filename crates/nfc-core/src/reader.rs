//! Boundary to the reader driver.
//!
//! The bridge never talks to a PC/SC library directly from the chip layer.
//! Instead it depends on three small traits:
//!
//! - [`ReaderDriver`] – enumerate readers and connect to the card on one.
//! - [`CardConnection`] – one connected card: ATR, disconnect.
//! - [`CardChannel`] – send one APDU, receive data plus status word.
//!
//! The production driver lives in `nfc-bridge` (`infrastructure::pcsc_reader`);
//! tests use the simulated tags in [`crate::chip::mock`].

use std::ops::{Deref, DerefMut};

use thiserror::Error;

/// Status word returned by the reader for a successful command.
pub const SW_SUCCESS: (u8, u8) = (0x90, 0x00);

/// Transport-level failures.  None of these ever escape a poll cycle; they
/// are resolved into a classified event by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The driver reported no readers.
    #[error("no reader available")]
    NoReader,

    /// The reader is present but no card answered.
    #[error("no card present in reader {0}")]
    NoCard(String),

    /// The driver failed to transmit an APDU or read an attribute.
    #[error("transmit failed: {0}")]
    Transmit(String),

    /// The reader's response did not even contain a status word.
    #[error("response too short: {0} byte(s)")]
    ShortResponse(usize),

    /// The PC/SC service (or equivalent) is unavailable.
    #[error("reader service unavailable: {0}")]
    Service(String),
}

/// One APDU response split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    /// Builds a `90 00` response carrying `data`.
    pub fn success(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            sw1: SW_SUCCESS.0,
            sw2: SW_SUCCESS.1,
        }
    }

    /// Builds a data-less response with the given status word.
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self {
            data: Vec::new(),
            sw1,
            sw2,
        }
    }

    /// Splits a raw driver response (`data || SW1 SW2`).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ShortResponse`] if `raw` is shorter than the
    /// two status bytes.
    pub fn from_raw(raw: &[u8]) -> Result<Self, TransportError> {
        if raw.len() < 2 {
            return Err(TransportError::ShortResponse(raw.len()));
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// `true` when the status word is `90 00`.
    pub const fn is_success(&self) -> bool {
        self.sw1 == SW_SUCCESS.0 && self.sw2 == SW_SUCCESS.1
    }
}

/// Sends APDUs to a connected card.
#[cfg_attr(test, mockall::automock)]
pub trait CardChannel {
    /// Transmits one command APDU and returns the response.
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, TransportError>;
}

/// A card that is connected for the duration of one poll cycle.
pub trait CardConnection: CardChannel {
    /// Returns the card's Answer-To-Reset.
    fn atr(&self) -> Result<Vec<u8>, TransportError>;

    /// Releases the card.  Failures are the driver's concern.
    fn disconnect(self);
}

/// Enumerates readers and connects to cards.
pub trait ReaderDriver {
    type Connection: CardConnection;

    /// Lists reader names in driver order.
    fn list_readers(&self) -> Result<Vec<String>, TransportError>;

    /// Connects to the card on `reader`.
    ///
    /// Returns [`TransportError::NoCard`] when the reader is empty.
    fn connect(&self, reader: &str) -> Result<Self::Connection, TransportError>;
}

/// Scoped card connection: disconnects when dropped.
///
/// Every path out of a poll cycle (early return, `?`, panic unwinding) drops
/// the session and therefore releases the card exactly once.
pub struct CardSession<C: CardConnection> {
    conn: Option<C>,
}

impl<C: CardConnection> CardSession<C> {
    pub fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }
}

impl<C: CardConnection> Deref for CardSession<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // `conn` is only taken in `drop`.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("card session used after release"))
    }
}

impl<C: CardConnection> DerefMut for CardSession<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("card session used after release"))
    }
}

impl<C: CardConnection> Drop for CardSession<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.disconnect();
        }
    }
}

impl<C: CardConnection> std::fmt::Debug for CardSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardSession")
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
