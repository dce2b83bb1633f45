//! PC/SC reader driver.
//!
//! Connects in shared mode with any protocol, so other applications can keep
//! using the reader.  The PC/SC context is established lazily on the first
//! cycle that needs it and thrown away when the resource manager reports
//! that it has gone, so a restarted `pcscd` (or a replugged Windows smart
//! card service) is picked up on a later cycle without restarting the
//! bridge.

use std::ffi::CString;
use std::sync::{Mutex, PoisonError};

use pcsc::{Attribute, Card, Context, Disposition, Protocols, Scope, ShareMode};
use tracing::{debug, info};

use nfc_core::{ApduResponse, CardChannel, CardConnection, ReaderDriver, TransportError};

/// [`ReaderDriver`] backed by the platform's PC/SC service.
#[derive(Default)]
pub struct PcscDriver {
    context: Mutex<Option<Context>>,
}

impl std::fmt::Debug for PcscDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let established = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("PcscDriver")
            .field("established", &established)
            .finish()
    }
}

impl PcscDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current context, establishing one if needed.
    fn context(&self) -> Result<Context, TransportError> {
        let mut slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = Context::establish(Scope::User)
            .map_err(|e| TransportError::Service(e.to_string()))?;
        info!("PC/SC context established");
        *slot = Some(ctx.clone());
        Ok(ctx)
    }

    /// Drops the context when `err` means the service is gone.
    fn note_error(&self, err: pcsc::Error) -> TransportError {
        if service_lost(err) {
            info!("PC/SC service lost ({err}); context will be re-established");
            *self.context.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        TransportError::Service(err.to_string())
    }
}

impl ReaderDriver for PcscDriver {
    type Connection = PcscCard;

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        let ctx = self.context()?;
        match ctx.list_readers_owned() {
            Ok(names) => Ok(names
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(self.note_error(e)),
        }
    }

    fn connect(&self, reader: &str) -> Result<PcscCard, TransportError> {
        let name = CString::new(reader).map_err(|_| TransportError::NoReader)?;
        let ctx = self.context()?;
        match ctx.connect(&name, ShareMode::Shared, Protocols::ANY) {
            Ok(card) => Ok(PcscCard { card }),
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(TransportError::NoCard(reader.to_owned()))
            }
            Err(pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable) => {
                Err(TransportError::NoReader)
            }
            Err(e) => Err(self.note_error(e)),
        }
    }
}

/// `true` for errors after which the context handle is useless.
fn service_lost(err: pcsc::Error) -> bool {
    matches!(
        err,
        pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::InvalidHandle
    )
}

/// A card connected through PC/SC.
pub struct PcscCard {
    card: Card,
}

impl std::fmt::Debug for PcscCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscCard").finish_non_exhaustive()
    }
}

impl CardChannel for PcscCard {
    fn transmit(&mut self, apdu: &[u8]) -> Result<ApduResponse, TransportError> {
        let mut buf = [0u8; pcsc::MAX_BUFFER_SIZE];
        let raw = self
            .card
            .transmit(apdu, &mut buf)
            .map_err(|e| TransportError::Transmit(e.to_string()))?;
        debug!(command = %hex::encode(apdu), response = %hex::encode(raw), "apdu");
        ApduResponse::from_raw(raw)
    }
}

impl CardConnection for PcscCard {
    fn atr(&self) -> Result<Vec<u8>, TransportError> {
        self.card
            .get_attribute_owned(Attribute::AtrString)
            .map_err(|e| TransportError::Transmit(e.to_string()))
    }

    fn disconnect(self) {
        if let Err((_, e)) = self.card.disconnect(Disposition::LeaveCard) {
            debug!("card disconnect failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
