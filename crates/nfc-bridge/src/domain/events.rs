//! Outcome of one poll cycle.

/// What one poll cycle observed.  Exactly one per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// No reader is attached (or the reader service is unavailable).
    NoReader,

    /// A reader is attached but no card answered.
    NoCard,

    /// The card's chip is not one the bridge can drive.
    UnsupportedTag { chip_name: String },

    /// A pending write was attempted on the card.
    WriteResult { success: bool, identity: String },

    /// The card carries a payload with a valid signature.
    ValidTag { identity: String },

    /// The card carries data whose signature does not verify.
    ///
    /// `raw` is kept for diagnostics only and must never be trusted.
    InvalidTag { raw: String },

    /// The card could not be read or holds no data.
    EmptyTag,
}

impl PollEvent {
    /// `true` for every outcome in which a reader was enumerated.
    pub fn reader_present(&self) -> bool {
        !matches!(self, Self::NoReader)
    }
}
