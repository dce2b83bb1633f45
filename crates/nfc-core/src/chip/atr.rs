//! Chip detection from the Answer-To-Reset.
//!
//! PC/SC readers synthesise an ATR for contactless storage cards that embeds
//! the registered application provider identifier `A0 00 00 03 06`, followed
//! by a standard byte (`SS`) and a two-byte card name (`C0 C1`).  The low
//! card-name byte identifies the chip:
//!
//! ```text
//! 3B 8F 80 01 80 4F 0C  A0 00 00 03 06  03  00 03  00 00 00 00  68
//!                       └──── RID ────┘  SS  C0 C1             TCK
//! ```

use super::ChipType;

/// PC/SC registered application provider identifier.
pub const PCSC_RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

/// Offset of the chip-type code relative to the end of [`PCSC_RID`].
const CODE_OFFSET: usize = 2;

/// ATR an ACR122U reports for a MIFARE Ultralight / NTAG tag.
pub const ATR_ULTRALIGHT: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x03, 0x00,
    0x00, 0x00, 0x00, 0x68,
];

/// ATR an ACR122U reports for a MIFARE Classic 1K card.
pub const ATR_CLASSIC_1K: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x6A,
];

/// ATR an ACR122U reports for a MIFARE Classic 4K card.
pub const ATR_CLASSIC_4K: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x02, 0x00,
    0x00, 0x00, 0x00, 0x69,
];

/// Returns the chip-type code embedded in `atr`, if the PC/SC pattern is present.
pub fn chip_code(atr: &[u8]) -> Option<u8> {
    let start = atr
        .windows(PCSC_RID.len())
        .position(|window| window == PCSC_RID)?;
    atr.get(start + PCSC_RID.len() + CODE_OFFSET).copied()
}

/// Classifies a card from its ATR.
///
/// # Examples
///
/// ```rust
/// use nfc_core::chip::atr::{detect, ATR_ULTRALIGHT};
/// use nfc_core::ChipType;
///
/// assert_eq!(detect(&ATR_ULTRALIGHT), ChipType::UltralightNtag);
/// assert_eq!(detect(&[0x3B, 0x00]), ChipType::Unsupported("unknown ATR".into()));
/// ```
pub fn detect(atr: &[u8]) -> ChipType {
    match chip_code(atr) {
        Some(0x03) => ChipType::UltralightNtag,
        Some(0x01) => ChipType::MifareClassic1K,
        Some(0x02) => ChipType::MifareClassic4K,
        Some(code) => ChipType::Unsupported(
            card_name(code)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("unknown (0x{code:02X})")),
        ),
        None => ChipType::Unsupported("unknown ATR".to_owned()),
    }
}

/// PC/SC standard card names for codes this bridge does not drive.
fn card_name(code: u8) -> Option<&'static str> {
    let name = match code {
        0x04 => "SLE55R",
        0x06 => "SR176",
        0x07 => "SRI X4K",
        0x12 => "Tag-it",
        0x14 => "ICODE SLI",
        0x16 => "ICODE1",
        0x26 => "MIFARE Mini",
        0x2F => "Jewel",
        0x30 => "Topaz",
        0x3A => "MIFARE Ultralight C",
        _ => return None,
    };
    Some(name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
