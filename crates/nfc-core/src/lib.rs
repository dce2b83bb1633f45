//! # nfc-core
//!
//! Shared library for NFC-Bridge containing the signed tag payload codec,
//! chip detection, and the APDU command sets for the two supported tag
//! families.
//!
//! This crate has no async runtime, no sockets, and no dependency on a
//! particular PC/SC binding.  The reader is reached only through the traits
//! in [`reader`], so every command sequence can be exercised against the
//! simulated tags in [`chip::mock`].
//!
//! # Architecture overview
//!
//! NFC-Bridge turns a USB contactless reader into a stream of "student card
//! scanned" events for browser clients.  Each card carries a short ASCII
//! string `<student_id>:<hmac>` that the bridge wrote earlier.
//!
//! - **`payload`** – Signs and verifies the `<id>:<hmac>` string.
//!
//! - **`reader`** – The boundary to the reader driver: enumerate readers,
//!   connect to a card, read its ATR, transmit an APDU.
//!
//! - **`chip`** – Everything that speaks bytes to the card: ATR
//!   classification, the NTAG/Ultralight page commands tunnelled through the
//!   reader's direct-transmit escape, the MIFARE Classic key-authenticated
//!   block commands, and the RF field reset used to resynchronise the reader.

pub mod chip;
pub mod payload;
pub mod reader;

// Re-export the most-used types at the crate root so callers can write
// `nfc_core::PayloadCodec` instead of `nfc_core::payload::PayloadCodec`.
pub use chip::{decode_user_data, reset_field, ChipError, ChipFamily, ChipType};
pub use payload::{PayloadCodec, PayloadError};
pub use reader::{
    ApduResponse, CardChannel, CardConnection, CardSession, ReaderDriver, TransportError,
};
