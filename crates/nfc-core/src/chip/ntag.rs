//! MIFARE Ultralight / NTAG21x command set.
//!
//! Page-addressed memory with 4-byte pages and no authentication.  User data
//! starts at page 4.  Every native command is tunnelled through the reader's
//! direct-transmit escape (see [`super::apdu::escape`]).
//!
//! | Command | Native bytes            | Reply            |
//! |---------|-------------------------|------------------|
//! | READ    | `30 <page>`             | 16 bytes (4 pages) |
//! | WRITE   | `A2 <page> b0 b1 b2 b3` | ACK              |

use tracing::debug;

use super::{apdu, encode_user_data, ChipError};
use crate::reader::CardChannel;

/// First page of user memory.
pub const FIRST_USER_PAGE: u8 = 4;

/// Bytes per page.
pub const PAGE_SIZE: usize = 4;

/// Bytes returned by one READ command.
pub const READ_SIZE: usize = 16;

/// Pages scanned by [`read`], starting at [`FIRST_USER_PAGE`].
pub const READ_PAGE_BUDGET: u8 = 20;

/// Bytes available for the payload including its NUL terminator.
///
/// Bounded by what [`read`] scans, not by the chip's user memory, so that
/// anything written can be read back whole.
pub const CAPACITY: usize = READ_PAGE_BUDGET as usize * PAGE_SIZE;

const CMD_READ: u8 = 0x30;
const CMD_WRITE: u8 = 0xA2;

/// Reads the first [`READ_PAGE_BUDGET`] user pages.
///
/// Reading stops at the first failed command; whatever was read before it is
/// still returned.
///
/// # Errors
///
/// Returns the error of the very first READ if no data could be read at all.
pub fn read<C: CardChannel + ?Sized>(channel: &mut C) -> Result<Vec<u8>, ChipError> {
    let mut data = Vec::with_capacity(CAPACITY);
    let pages_per_read = READ_SIZE / PAGE_SIZE;

    for page in (FIRST_USER_PAGE..FIRST_USER_PAGE + READ_PAGE_BUDGET).step_by(pages_per_read) {
        match transceive(channel, &[CMD_READ, page]) {
            Ok(block) => data.extend(block.into_iter().take(READ_SIZE)),
            Err(e) if data.is_empty() => return Err(e),
            Err(e) => {
                debug!(page, error = %e, "NTAG read stopped early");
                break;
            }
        }
    }
    Ok(data)
}

/// Writes `payload` as NUL-terminated ASCII, one page at a time from page 4.
///
/// The write is not transactional: pages written before a failure stay
/// written.
///
/// # Errors
///
/// - [`ChipError::NonAsciiPayload`] before any command is sent.
/// - [`ChipError::CapacityExceeded`] if the data exceeds [`CAPACITY`], before
///   any page is touched.
/// - The error of the first page that failed.
pub fn write<C: CardChannel + ?Sized>(channel: &mut C, payload: &str) -> Result<(), ChipError> {
    let data = encode_user_data(payload, PAGE_SIZE)?;
    if data.len() > CAPACITY {
        return Err(ChipError::CapacityExceeded {
            needed: data.len(),
            capacity: CAPACITY,
        });
    }

    for (page, chunk) in (FIRST_USER_PAGE..).zip(data.chunks_exact(PAGE_SIZE)) {
        let mut cmd = [CMD_WRITE, page, 0, 0, 0, 0];
        cmd[2..].copy_from_slice(chunk);
        if let Err(e) = transceive(channel, &cmd) {
            debug!(page, error = %e, "NTAG write failed");
            return Err(e);
        }
        debug!(page, "NTAG page written");
    }
    Ok(())
}

fn transceive<C: CardChannel + ?Sized>(
    channel: &mut C,
    native: &[u8],
) -> Result<Vec<u8>, ChipError> {
    let resp = channel.transmit(&apdu::escape(native)?)?;
    apdu::unwrap_direct_transmit(resp)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
