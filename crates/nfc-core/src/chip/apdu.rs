//! APDU frames understood by ACR122U-class readers.
//!
//! Two kinds of frames are built here:
//!
//! - **Pseudo-APDUs** addressed to the reader itself (`CLA = FF`): RF field
//!   control, direct transmit, and the PC/SC storage-card commands used for
//!   MIFARE Classic (load key, authenticate, read/update binary).
//! - **Direct transmit** escapes that tunnel a native tag command through the
//!   reader's PN532 controller:
//!
//! ```text
//! request:  FF 00 00 00 Lc D4 42 <native command...>
//! response: D5 43 <status> <data...> 90 00
//! ```
//!
//! A PN532 status of `00` means the tag acknowledged the command.

use crate::chip::ChipError;
use crate::reader::ApduResponse;

/// Reader-level class byte.
pub const CLA_READER: u8 = 0xFF;

/// PN532 `InCommunicateThru` command header.
pub const DIRECT_TRANSMIT: [u8; 2] = [0xD4, 0x42];

/// PN532 `InCommunicateThru` response header.
pub const DIRECT_TRANSMIT_REPLY: [u8; 2] = [0xD5, 0x43];

/// PN532 `RFConfiguration` command header.
pub const RF_CONFIGURATION: [u8; 2] = [0xD4, 0x32];

/// Size of one MIFARE Classic data block.
pub const BLOCK_SIZE: usize = 16;

/// Authentication key slot in the reader's volatile key store.
pub const KEY_SLOT: u8 = 0x00;

/// Key type byte for key A.
pub const KEY_TYPE_A: u8 = 0x60;

// ── Frame builders ────────────────────────────────────────────────────────────

/// Wraps a native tag command in a direct-transmit escape frame.
///
/// # Errors
///
/// Returns [`ChipError::FrameTooLong`] when `native` plus the `D4 42` header
/// exceeds the 255 bytes a short Lc can announce.
///
/// # Examples
///
/// ```rust
/// use nfc_core::chip::apdu::escape;
///
/// assert_eq!(
///     escape(&[0x30, 0x04]).unwrap(),
///     vec![0xFF, 0x00, 0x00, 0x00, 0x04, 0xD4, 0x42, 0x30, 0x04]
/// );
/// ```
pub fn escape(native: &[u8]) -> Result<Vec<u8>, ChipError> {
    let lc = u8::try_from(DIRECT_TRANSMIT.len() + native.len())
        .map_err(|_| ChipError::FrameTooLong(native.len()))?;
    let mut frame = Vec::with_capacity(5 + lc as usize);
    frame.extend_from_slice(&[CLA_READER, 0x00, 0x00, 0x00, lc]);
    frame.extend_from_slice(&DIRECT_TRANSMIT);
    frame.extend_from_slice(native);
    Ok(frame)
}

/// Switches the reader's RF field off (`false`) or on (`true`).
pub const fn rf_field(on: bool) -> [u8; 9] {
    [
        CLA_READER,
        0x00,
        0x00,
        0x00,
        0x04,
        RF_CONFIGURATION[0],
        RF_CONFIGURATION[1],
        0x01,
        on as u8,
    ]
}

/// Loads a 6-byte key into key slot 0.
pub fn load_key(key: &[u8; 6]) -> [u8; 11] {
    let mut frame = [0u8; 11];
    frame[..5].copy_from_slice(&[CLA_READER, 0x82, 0x00, KEY_SLOT, 0x06]);
    frame[5..].copy_from_slice(key);
    frame
}

/// Authenticates `block` with key A from key slot 0.
pub const fn authenticate(block: u8) -> [u8; 10] {
    [
        CLA_READER, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, KEY_TYPE_A, KEY_SLOT,
    ]
}

/// Reads one 16-byte block.
pub const fn read_binary(block: u8) -> [u8; 5] {
    [CLA_READER, 0xB0, 0x00, block, BLOCK_SIZE as u8]
}

/// Writes one 16-byte block.
pub fn update_binary(block: u8, data: &[u8; BLOCK_SIZE]) -> [u8; 5 + BLOCK_SIZE] {
    let mut frame = [0u8; 5 + BLOCK_SIZE];
    frame[..5].copy_from_slice(&[CLA_READER, 0xD6, 0x00, block, BLOCK_SIZE as u8]);
    frame[5..].copy_from_slice(data);
    frame
}

// ── Response checks ───────────────────────────────────────────────────────────

/// Fails unless the response carries status word `90 00`.
pub fn expect_success(resp: &ApduResponse) -> Result<(), ChipError> {
    if resp.is_success() {
        Ok(())
    } else {
        Err(ChipError::Status {
            sw1: resp.sw1,
            sw2: resp.sw2,
        })
    }
}

/// Unwraps a direct-transmit reply and returns the tag's response bytes.
///
/// # Errors
///
/// - [`ChipError::Status`] when the reader itself rejected the frame.
/// - [`ChipError::UnexpectedResponse`] when the `D5 43` header is missing.
/// - [`ChipError::TagStatus`] when the tag answered with a non-zero status.
pub fn unwrap_direct_transmit(resp: ApduResponse) -> Result<Vec<u8>, ChipError> {
    expect_success(&resp)?;

    let mut data = resp.data;
    if data.len() < 3 || data[..2] != DIRECT_TRANSMIT_REPLY {
        return Err(ChipError::UnexpectedResponse(hex::encode(&data)));
    }
    if data[2] != 0x00 {
        return Err(ChipError::TagStatus(data[2]));
    }
    Ok(data.split_off(3))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
