//! Chip command layer.
//!
//! The card on the reader is classified once per cycle from its ATR
//! ([`atr::detect`]) into a [`ChipType`].  Supported types map to a
//! [`ChipFamily`], which selects one of two structurally different command
//! sequences behind the same `read`/`write` contract:
//!
//! - [`ntag`] – page-addressed, commands tunnelled through direct transmit.
//! - [`mifare`] – block-addressed, key A authentication per sector.
//!
//! [`reset_field`] cycles the reader's RF field to recover from a
//! desynchronised reader/tag pairing.

pub mod apdu;
pub mod atr;
pub mod mifare;
pub mod mock;
pub mod ntag;

use std::fmt;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::reader::{CardChannel, TransportError};

pub use atr::detect;

/// Pause between switching the RF field off and on again.
pub const RF_RESET_PAUSE: Duration = Duration::from_millis(100);

/// Protocol-level failures of a chip command sequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChipError {
    /// The driver could not carry the command.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The reader answered with a status word other than `90 00`.
    #[error("reader returned status {sw1:02X} {sw2:02X}")]
    Status { sw1: u8, sw2: u8 },

    /// A direct-transmit reply did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The tag rejected a tunnelled command.
    #[error("tag reported status 0x{0:02X}")]
    TagStatus(u8),

    /// Key A was refused for the sector containing `block`.
    #[error("authentication failed for block {block}")]
    AuthenticationFailed { block: u8 },

    /// The encoded payload does not fit in user memory.
    #[error("payload needs {needed} bytes but the tag holds {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// Payloads are stored as ASCII.
    #[error("payload is not ASCII")]
    NonAsciiPayload,

    /// A native command too long for a one-byte Lc.
    #[error("native command of {0} bytes does not fit in a direct-transmit frame")]
    FrameTooLong(usize),
}

// ── Chip classification ───────────────────────────────────────────────────────

/// Chip type derived from the ATR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChipType {
    UltralightNtag,
    MifareClassic1K,
    MifareClassic4K,
    /// Anything else, with its resolved human-readable name.
    Unsupported(String),
}

impl ChipType {
    /// Human-readable chip name.
    pub fn name(&self) -> &str {
        match self {
            Self::UltralightNtag => "MIFARE Ultralight / NTAG",
            Self::MifareClassic1K => "MIFARE Classic 1K",
            Self::MifareClassic4K => "MIFARE Classic 4K",
            Self::Unsupported(name) => name,
        }
    }

    /// Selects the command set for this chip, or `None` if unsupported.
    ///
    /// `mifare_key` is the key A used to authenticate MIFARE Classic sectors.
    pub fn family(&self, mifare_key: [u8; 6]) -> Option<ChipFamily> {
        match self {
            Self::UltralightNtag => Some(ChipFamily::Ntag),
            Self::MifareClassic1K | Self::MifareClassic4K => {
                Some(ChipFamily::MifareClassic { key: mifare_key })
            }
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command set selected once per cycle for a supported chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipFamily {
    Ntag,
    MifareClassic { key: [u8; 6] },
}

impl ChipFamily {
    /// Reads the raw user-data area.
    ///
    /// # Errors
    ///
    /// Returns [`ChipError`] if the tag could not be read.
    pub fn read<C: CardChannel + ?Sized>(&self, channel: &mut C) -> Result<Vec<u8>, ChipError> {
        match self {
            Self::Ntag => ntag::read(channel),
            Self::MifareClassic { key } => mifare::read(channel, key),
        }
    }

    /// Writes `payload` as NUL-terminated ASCII to the user-data area.
    ///
    /// # Errors
    ///
    /// Returns [`ChipError`] if the payload was rejected or a command failed.
    pub fn write<C: CardChannel + ?Sized>(
        &self,
        channel: &mut C,
        payload: &str,
    ) -> Result<(), ChipError> {
        match self {
            Self::Ntag => ntag::write(channel, payload),
            Self::MifareClassic { key } => mifare::write(channel, key, payload),
        }
    }
}

// ── User data ─────────────────────────────────────────────────────────────────

/// Decodes raw user memory into the stored string.
///
/// Truncates at the first NUL, then requires ASCII and trims whitespace.
/// Returns `None` for non-ASCII or empty content.
pub fn decode_user_data(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let bytes = &raw[..end];
    if !bytes.is_ascii() {
        return None;
    }
    // ASCII is always valid UTF-8.
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// ASCII bytes of `payload`, one NUL, then zero padding to a multiple of `align`.
pub(crate) fn encode_user_data(payload: &str, align: usize) -> Result<Vec<u8>, ChipError> {
    if !payload.is_ascii() {
        return Err(ChipError::NonAsciiPayload);
    }
    let mut data = Vec::with_capacity(payload.len() + align);
    data.extend_from_slice(payload.as_bytes());
    data.push(0x00);
    let padded = data.len().div_ceil(align) * align;
    data.resize(padded, 0x00);
    Ok(data)
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Switches the RF field off and back on so the next cycle starts clean.
///
/// Best effort: failures are logged at debug level and otherwise ignored.
pub fn reset_field<C: CardChannel + ?Sized>(channel: &mut C) {
    switch_rf_field(channel, false);
    thread::sleep(RF_RESET_PAUSE);
    switch_rf_field(channel, true);
}

fn switch_rf_field<C: CardChannel + ?Sized>(channel: &mut C, on: bool) {
    match channel.transmit(&apdu::rf_field(on)) {
        Ok(resp) if !resp.is_success() => {
            debug!(on, sw1 = resp.sw1, sw2 = resp.sw2, "RF field command rejected");
        }
        Ok(_) => {}
        Err(e) => debug!(on, error = %e, "RF field command failed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
