//! Simulated reader and tags for tests and benchmarks.
//!
//! [`SimulatedTag`] interprets the same APDUs an ACR122U forwards to a real
//! card: direct-transmit NTAG READ/WRITE for an Ultralight/NTAG tag, and the
//! PC/SC load-key / authenticate / read-binary / update-binary pseudo-APDUs
//! for a MIFARE Classic card.  Memory lives behind an `Arc<Mutex<_>>`, so a
//! tag keeps its contents across connections and can be inspected by the
//! test after the bridge has released it.
//!
//! [`SimulatedDriver`] is a [`ReaderDriver`] with a configurable reader list
//! and at most one card on the first reader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::atr::{ATR_CLASSIC_1K, ATR_CLASSIC_4K, ATR_ULTRALIGHT};
use super::mifare::{sector_of, USER_BLOCKS};
use super::ntag::FIRST_USER_PAGE;
use crate::reader::{ApduResponse, CardChannel, CardConnection, ReaderDriver, TransportError};

/// Reader name reported by [`SimulatedDriver::new`].
pub const SIMULATED_READER: &str = "ACS ACR122U PICC Interface 00 00";

/// Total pages of an NTAG213.
const NTAG213_PAGES: usize = 45;

/// PN532 status for a tag that did not acknowledge.
const PN532_TIMEOUT: u8 = 0x01;

// ── Tag ───────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Memory {
    Pages(Vec<[u8; 4]>),
    Blocks { data: Vec<[u8; 16]>, key: [u8; 6] },
    Opaque,
}

#[derive(Debug)]
struct TagState {
    atr: Vec<u8>,
    atr_readable: bool,
    memory: Memory,
    loaded_key: Option<[u8; 6]>,
    authenticated_sector: Option<u8>,
    failing_page: Option<u8>,
    failing_block: Option<u8>,
    transmitted: Vec<Vec<u8>>,
    rf_resets: usize,
    disconnects: usize,
}

/// A card with persistent memory.  Clones share the same card.
#[derive(Debug, Clone)]
pub struct SimulatedTag {
    state: Arc<Mutex<TagState>>,
}

impl SimulatedTag {
    fn with_memory(atr: &[u8], memory: Memory) -> Self {
        Self {
            state: Arc::new(Mutex::new(TagState {
                atr: atr.to_vec(),
                atr_readable: true,
                memory,
                loaded_key: None,
                authenticated_sector: None,
                failing_page: None,
                failing_block: None,
                transmitted: Vec::new(),
                rf_resets: 0,
                disconnects: 0,
            })),
        }
    }

    /// A blank NTAG213 (45 pages).
    pub fn ntag213() -> Self {
        Self::with_memory(&ATR_ULTRALIGHT, Memory::Pages(vec![[0; 4]; NTAG213_PAGES]))
    }

    /// A blank MIFARE Classic 1K whose sectors accept `key` as key A.
    pub fn mifare_classic_1k(key: [u8; 6]) -> Self {
        Self::with_memory(
            &ATR_CLASSIC_1K,
            Memory::Blocks {
                data: vec![[0; 16]; 64],
                key,
            },
        )
    }

    /// A blank MIFARE Classic 4K whose sectors accept `key` as key A.
    pub fn mifare_classic_4k(key: [u8; 6]) -> Self {
        Self::with_memory(
            &ATR_CLASSIC_4K,
            Memory::Blocks {
                data: vec![[0; 16]; 256],
                key,
            },
        )
    }

    /// A card that answers with `atr` and rejects every command.
    pub fn with_atr(atr: &[u8]) -> Self {
        Self::with_memory(atr, Memory::Opaque)
    }

    /// Preloads the user area with `bytes` (zero-filled after).
    pub fn with_user_data(self, bytes: &[u8]) -> Self {
        {
            let mut state = self.lock();
            match &mut state.memory {
                Memory::Pages(pages) => {
                    let user = pages.iter_mut().skip(FIRST_USER_PAGE as usize);
                    let mut chunks = bytes.chunks(4);
                    for page in user {
                        *page = [0; 4];
                        if let Some(chunk) = chunks.next() {
                            page[..chunk.len()].copy_from_slice(chunk);
                        }
                    }
                }
                Memory::Blocks { data, .. } => {
                    let mut chunks = bytes.chunks(16);
                    for block in USER_BLOCKS {
                        let slot = &mut data[block as usize];
                        *slot = [0; 16];
                        if let Some(chunk) = chunks.next() {
                            slot[..chunk.len()].copy_from_slice(chunk);
                        }
                    }
                }
                Memory::Opaque => {}
            }
        }
        self
    }

    /// NAKs every write to `page` and beyond.
    pub fn fail_writes_from_page(self, page: u8) -> Self {
        self.lock().failing_page = Some(page);
        self
    }

    /// Rejects updates of `block`.
    pub fn fail_block_update(self, block: u8) -> Self {
        self.lock().failing_block = Some(block);
        self
    }

    /// Makes [`CardConnection::atr`] fail, as if the card left mid-connect.
    pub fn with_unreadable_atr(self) -> Self {
        self.lock().atr_readable = false;
        self
    }

    /// Opens a connection to this card.
    pub fn connect(&self) -> SimulatedConnection {
        SimulatedConnection { tag: self.clone() }
    }

    /// Every APDU received so far, in order.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.lock().transmitted.clone()
    }

    /// Number of RF-field-off commands received.
    pub fn rf_resets(&self) -> usize {
        self.lock().rf_resets
    }

    /// Number of times a connection to this card was released.
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    /// Raw bytes of the user area: pages 4.. or the MIFARE user blocks.
    pub fn user_data(&self) -> Vec<u8> {
        match &self.lock().memory {
            Memory::Pages(pages) => pages
                .iter()
                .skip(FIRST_USER_PAGE as usize)
                .flatten()
                .copied()
                .collect(),
            Memory::Blocks { data, .. } => USER_BLOCKS
                .iter()
                .flat_map(|&b| data[b as usize])
                .collect(),
            Memory::Opaque => Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TagState {
    fn respond(&mut self, apdu: &[u8]) -> ApduResponse {
        match apdu {
            [0xFF, 0x00, 0x00, 0x00, _, 0xD4, 0x32, 0x01, on] => {
                if *on == 0 {
                    self.rf_resets += 1;
                    self.authenticated_sector = None;
                }
                ApduResponse::success(vec![0xD5, 0x33])
            }
            [0xFF, 0x00, 0x00, 0x00, _, 0xD4, 0x42, native @ ..] => {
                ApduResponse::success(self.communicate(native))
            }
            [0xFF, 0x82, 0x00, 0x00, 0x06, key @ ..] => match <[u8; 6]>::try_from(key) {
                Ok(key) => {
                    self.loaded_key = Some(key);
                    ApduResponse::success(vec![])
                }
                Err(_) => ApduResponse::status(0x67, 0x00),
            },
            [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, 0x60, 0x00] => {
                self.authenticate(*block)
            }
            [0xFF, 0xB0, 0x00, block, 0x10] => self.read_block(*block),
            [0xFF, 0xD6, 0x00, block, 0x10, data @ ..] => self.update_block(*block, data),
            _ => ApduResponse::status(0x6A, 0x81),
        }
    }

    /// Handles a tunnelled native command and returns the PN532 reply.
    fn communicate(&mut self, native: &[u8]) -> Vec<u8> {
        let Memory::Pages(pages) = &mut self.memory else {
            return vec![0xD5, 0x43, PN532_TIMEOUT];
        };

        match native {
            [0x30, page] if (*page as usize) < pages.len() => {
                let mut reply = vec![0xD5, 0x43, 0x00];
                // READ wraps around to page 0 past the end of memory.
                for i in 0..4 {
                    reply.extend_from_slice(&pages[(*page as usize + i) % pages.len()]);
                }
                reply
            }
            [0xA2, page, b0, b1, b2, b3]
                if *page >= FIRST_USER_PAGE
                    && (*page as usize) < pages.len()
                    && self.failing_page.map_or(true, |f| *page < f) =>
            {
                pages[*page as usize] = [*b0, *b1, *b2, *b3];
                vec![0xD5, 0x43, 0x00]
            }
            _ => vec![0xD5, 0x43, PN532_TIMEOUT],
        }
    }

    fn authenticate(&mut self, block: u8) -> ApduResponse {
        self.authenticated_sector = None;
        if let Memory::Blocks { data, key } = &self.memory {
            if self.loaded_key == Some(*key) && (block as usize) < data.len() {
                self.authenticated_sector = Some(sector_of(block));
                return ApduResponse::success(vec![]);
            }
        }
        ApduResponse::status(0x63, 0x00)
    }

    fn read_block(&self, block: u8) -> ApduResponse {
        match &self.memory {
            Memory::Blocks { data, .. }
                if self.authenticated_sector == Some(sector_of(block))
                    && (block as usize) < data.len() =>
            {
                ApduResponse::success(data[block as usize].to_vec())
            }
            _ => ApduResponse::status(0x69, 0x82),
        }
    }

    fn update_block(&mut self, block: u8, bytes: &[u8]) -> ApduResponse {
        if self.failing_block == Some(block) {
            return ApduResponse::status(0x65, 0x81);
        }
        let authenticated = self.authenticated_sector == Some(sector_of(block));
        match (&mut self.memory, <[u8; 16]>::try_from(bytes)) {
            (Memory::Blocks { data, .. }, Ok(bytes))
                if authenticated && (block as usize) < data.len() =>
            {
                data[block as usize] = bytes;
                ApduResponse::success(vec![])
            }
            _ => ApduResponse::status(0x69, 0x82),
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// One connection to a [`SimulatedTag`].
#[derive(Debug)]
pub struct SimulatedConnection {
    tag: SimulatedTag,
}

impl CardChannel for SimulatedConnection {
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, TransportError> {
        let mut state = self.tag.lock();
        state.transmitted.push(apdu.to_vec());
        Ok(state.respond(apdu))
    }
}

impl CardConnection for SimulatedConnection {
    fn atr(&self) -> Result<Vec<u8>, TransportError> {
        let state = self.tag.lock();
        if state.atr_readable {
            Ok(state.atr.clone())
        } else {
            Err(TransportError::Transmit("card removed during connect".into()))
        }
    }

    fn disconnect(self) {
        let mut state = self.tag.lock();
        state.disconnects += 1;
        state.authenticated_sector = None;
        state.loaded_key = None;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Reader driver with one optional card on the first reader.
#[derive(Debug)]
pub struct SimulatedDriver {
    readers: Mutex<Vec<String>>,
    card: Mutex<Option<SimulatedTag>>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    /// One empty reader named [`SIMULATED_READER`].
    pub fn new() -> Self {
        Self {
            readers: Mutex::new(vec![SIMULATED_READER.to_owned()]),
            card: Mutex::new(None),
        }
    }

    /// No readers attached.
    pub fn without_readers() -> Self {
        let driver = Self::new();
        driver.set_readers(Vec::new());
        driver
    }

    /// Replaces the reader list (unplug / replug).
    pub fn set_readers(&self, names: Vec<String>) {
        *self.readers.lock().unwrap_or_else(PoisonError::into_inner) = names;
    }

    /// Places `tag` on the first reader, replacing any card already there.
    pub fn insert(&self, tag: SimulatedTag) {
        *self.card.lock().unwrap_or_else(PoisonError::into_inner) = Some(tag);
    }

    /// Takes the card off the reader.
    pub fn remove(&self) -> Option<SimulatedTag> {
        self.card.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl ReaderDriver for SimulatedDriver {
    type Connection = SimulatedConnection;

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.readers.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn connect(&self, reader: &str) -> Result<SimulatedConnection, TransportError> {
        let readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        if readers.first().map(String::as_str) != Some(reader) {
            return Err(TransportError::NoReader);
        }
        self.card
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(SimulatedTag::connect)
            .ok_or_else(|| TransportError::NoCard(reader.to_owned()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
