//! MIFARE Classic 1K / 4K command set.
//!
//! Block-addressed memory with 16-byte blocks grouped into key-protected
//! sectors.  The bridge keeps its payload in six interior blocks of sectors 1
//! and 2; block 0 (manufacturer data) and the sector trailers (3, 7, 11)
//! are never touched.
//!
//! Every operation loads the key into the reader once, then authenticates
//! with key A whenever the next block lives in a different sector from the
//! last authenticated one.  Any failure aborts the whole operation.

use tracing::debug;

use super::apdu::{self, BLOCK_SIZE};
use super::{encode_user_data, ChipError};
use crate::reader::CardChannel;

/// Blocks holding the payload, in order.
pub const USER_BLOCKS: [u8; 6] = [4, 5, 6, 8, 9, 10];

/// Bytes available for the payload including its NUL terminator.
pub const CAPACITY: usize = USER_BLOCKS.len() * BLOCK_SIZE;

/// Transport key most cards ship with.
pub const DEFAULT_KEY: [u8; 6] = [0xFF; 6];

/// Returns the sector that contains `block`.
///
/// The first 32 sectors hold 4 blocks each; the 8 large sectors of a 4K card
/// hold 16.
pub const fn sector_of(block: u8) -> u8 {
    if block < 128 {
        block / 4
    } else {
        32 + (block - 128) / 16
    }
}

/// Reads all [`USER_BLOCKS`] and concatenates them.
///
/// # Errors
///
/// Fails on the first key-load, authentication, or block read that does not
/// succeed; no partial data is returned.
pub fn read<C: CardChannel + ?Sized>(channel: &mut C, key: &[u8; 6]) -> Result<Vec<u8>, ChipError> {
    let mut session = SectorSession::open(channel, key)?;
    let mut data = Vec::with_capacity(CAPACITY);

    for block in USER_BLOCKS {
        session.authenticate_for(block)?;
        let resp = session.channel.transmit(&apdu::read_binary(block))?;
        apdu::expect_success(&resp)?;
        if resp.data.len() != BLOCK_SIZE {
            return Err(ChipError::UnexpectedResponse(hex::encode(&resp.data)));
        }
        data.extend_from_slice(&resp.data);
    }
    Ok(data)
}

/// Writes `payload` as NUL-terminated ASCII padded to whole blocks.
///
/// # Errors
///
/// - [`ChipError::NonAsciiPayload`] or [`ChipError::CapacityExceeded`]
///   before any command is sent.
/// - The first key-load, authentication, or block update that fails.
pub fn write<C: CardChannel + ?Sized>(
    channel: &mut C,
    key: &[u8; 6],
    payload: &str,
) -> Result<(), ChipError> {
    let data = encode_user_data(payload, BLOCK_SIZE)?;
    if data.len() > CAPACITY {
        return Err(ChipError::CapacityExceeded {
            needed: data.len(),
            capacity: CAPACITY,
        });
    }

    let mut session = SectorSession::open(channel, key)?;
    for (block, chunk) in USER_BLOCKS.into_iter().zip(data.chunks_exact(BLOCK_SIZE)) {
        session.authenticate_for(block)?;
        let mut buf = [0u8; BLOCK_SIZE];
        buf.copy_from_slice(chunk);
        let resp = session.channel.transmit(&apdu::update_binary(block, &buf))?;
        apdu::expect_success(&resp)?;
        debug!(block, "MIFARE block written");
    }
    Ok(())
}

// ── Sector authentication ─────────────────────────────────────────────────────

/// Tracks which sector the reader is currently authenticated for.
struct SectorSession<'a, C: CardChannel + ?Sized> {
    channel: &'a mut C,
    sector: Option<u8>,
}

impl<'a, C: CardChannel + ?Sized> SectorSession<'a, C> {
    /// Loads `key` into the reader's key slot.
    fn open(channel: &'a mut C, key: &[u8; 6]) -> Result<Self, ChipError> {
        let resp = channel.transmit(&apdu::load_key(key))?;
        apdu::expect_success(&resp)?;
        Ok(Self {
            channel,
            sector: None,
        })
    }

    fn authenticate_for(&mut self, block: u8) -> Result<(), ChipError> {
        let sector = sector_of(block);
        if self.sector == Some(sector) {
            return Ok(());
        }

        let resp = self.channel.transmit(&apdu::authenticate(block))?;
        if !resp.is_success() {
            self.sector = None;
            return Err(ChipError::AuthenticationFailed { block });
        }
        debug!(sector, "MIFARE sector authenticated");
        self.sector = Some(sector);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ApduResponse, MockCardChannel};
    use mockall::Sequence;

    fn expect_ok(mock: &mut MockCardChannel, seq: &mut Sequence, frame: Vec<u8>) {
        mock.expect_transmit()
            .withf(move |apdu| apdu.to_vec() == frame)
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(ApduResponse::success(vec![])));
    }

    fn expect_read(mock: &mut MockCardChannel, seq: &mut Sequence, block: u8) {
        mock.expect_transmit()
            .withf(move |apdu| apdu.to_vec() == vec![0xFF, 0xB0, 0x00, block, 0x10])
            .times(1)
            .in_sequence(seq)
            .returning(move |_| Ok(ApduResponse::success(vec![block; 16])));
    }

    #[test]
    fn test_sector_of() {
        assert_eq!(sector_of(4), 1);
        assert_eq!(sector_of(6), 1);
        assert_eq!(sector_of(8), 2);
        assert_eq!(sector_of(127), 31);
        assert_eq!(sector_of(128), 32);
        assert_eq!(sector_of(255), 39);
    }

    #[test]
    fn test_read_authenticates_once_per_sector() {
        // Arrange
        let key = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5];
        let mut mock = MockCardChannel::new();
        let mut seq = Sequence::new();
        expect_ok(&mut mock, &mut seq, apdu::load_key(&key).to_vec());
        expect_ok(&mut mock, &mut seq, apdu::authenticate(4).to_vec());
        expect_read(&mut mock, &mut seq, 4);
        expect_read(&mut mock, &mut seq, 5);
        expect_read(&mut mock, &mut seq, 6);
        expect_ok(&mut mock, &mut seq, apdu::authenticate(8).to_vec());
        expect_read(&mut mock, &mut seq, 8);
        expect_read(&mut mock, &mut seq, 9);
        expect_read(&mut mock, &mut seq, 10);

        // Act
        let data = read(&mut mock, &key).unwrap();

        // Assert
        assert_eq!(data.len(), CAPACITY);
        assert_eq!(&data[..16], &[4; 16]);
        assert_eq!(&data[80..], &[10; 16]);
    }

    #[test]
    fn test_read_aborts_on_authentication_failure() {
        let mut mock = MockCardChannel::new();
        let mut seq = Sequence::new();
        expect_ok(&mut mock, &mut seq, apdu::load_key(&DEFAULT_KEY).to_vec());
        mock.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApduResponse::status(0x63, 0x00)));

        let err = read(&mut mock, &DEFAULT_KEY).unwrap_err();

        assert_eq!(err, ChipError::AuthenticationFailed { block: 4 });
    }

    #[test]
    fn test_read_aborts_on_block_failure_in_second_sector() {
        let mut mock = MockCardChannel::new();
        let mut seq = Sequence::new();
        expect_ok(&mut mock, &mut seq, apdu::load_key(&DEFAULT_KEY).to_vec());
        expect_ok(&mut mock, &mut seq, apdu::authenticate(4).to_vec());
        expect_read(&mut mock, &mut seq, 4);
        expect_read(&mut mock, &mut seq, 5);
        expect_read(&mut mock, &mut seq, 6);
        expect_ok(&mut mock, &mut seq, apdu::authenticate(8).to_vec());
        mock.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApduResponse::status(0x69, 0x82)));

        let err = read(&mut mock, &DEFAULT_KEY).unwrap_err();

        assert_eq!(err, ChipError::Status { sw1: 0x69, sw2: 0x82 });
    }

    #[test]
    fn test_read_rejects_short_block() {
        let mut mock = MockCardChannel::new();
        let mut seq = Sequence::new();
        expect_ok(&mut mock, &mut seq, apdu::load_key(&DEFAULT_KEY).to_vec());
        expect_ok(&mut mock, &mut seq, apdu::authenticate(4).to_vec());
        mock.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApduResponse::success(vec![0x01, 0x02])));

        let err = read(&mut mock, &DEFAULT_KEY).unwrap_err();

        assert_eq!(err, ChipError::UnexpectedResponse("0102".into()));
    }

    #[test]
    fn test_write_updates_only_needed_blocks() {
        // Arrange: 20 ASCII bytes + NUL → 2 blocks, both in sector 1
        let payload = "0123456789abcdefghij";
        let mut mock = MockCardChannel::new();
        let mut seq = Sequence::new();
        expect_ok(&mut mock, &mut seq, apdu::load_key(&DEFAULT_KEY).to_vec());
        expect_ok(&mut mock, &mut seq, apdu::authenticate(4).to_vec());

        let mut first = [0u8; 16];
        first.copy_from_slice(&payload.as_bytes()[..16]);
        expect_ok(&mut mock, &mut seq, apdu::update_binary(4, &first).to_vec());

        let mut second = [0u8; 16];
        second[..4].copy_from_slice(b"ghij");
        expect_ok(&mut mock, &mut seq, apdu::update_binary(5, &second).to_vec());

        // Act / Assert
        write(&mut mock, &DEFAULT_KEY, payload).unwrap();
    }

    #[test]
    fn test_write_rejects_oversized_payload_before_any_command() {
        let mut mock = MockCardChannel::new();
        mock.expect_transmit().never();

        let err = write(&mut mock, &DEFAULT_KEY, &"x".repeat(96)).unwrap_err();

        assert_eq!(
            err,
            ChipError::CapacityExceeded {
                needed: 112,
                capacity: 96
            }
        );
    }

    #[test]
    fn test_write_fills_capacity_exactly() {
        let mut mock = MockCardChannel::new();
        // load key + 2 auths + 6 updates
        mock.expect_transmit()
            .times(9)
            .returning(|_| Ok(ApduResponse::success(vec![])));

        write(&mut mock, &DEFAULT_KEY, &"x".repeat(95)).unwrap();
    }

    #[test]
    fn test_write_aborts_when_key_load_fails() {
        let mut mock = MockCardChannel::new();
        mock.expect_transmit()
            .times(1)
            .returning(|_| Ok(ApduResponse::status(0x63, 0x00)));

        let err = write(&mut mock, &DEFAULT_KEY, "42").unwrap_err();

        assert_eq!(err, ChipError::Status { sw1: 0x63, sw2: 0x00 });
    }
}
