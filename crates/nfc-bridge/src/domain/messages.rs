//! JSON message types for the browser-facing WebSocket protocol.
//!
//! Every message is a JSON object with a `"type"` field naming the variant;
//! the remaining fields sit in the same object:
//!
//! ```json
//! {"type":"tag_scan","student_id":"42"}
//! {"type":"write_tag","student_id":"42"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//! Two enums keep the directions apart, so the bridge can never parse one of
//! its own notifications as a command.

use serde::{Deserialize, Serialize};

/// Error text sent when a tag's signature does not verify.
pub const INVALID_TAG_MESSAGE: &str = "Invalid or unsigned tag";

// ── Bridge → Browser ──────────────────────────────────────────────────────────

/// Notifications the bridge sends to every connected browser.
///
/// ```json
/// {"type":"reader_status","connected":true}
/// {"type":"tag_scan","student_id":"42"}
/// {"type":"write_complete","success":true,"student_id":"42"}
/// {"type":"error","message":"Invalid or unsigned tag"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// The reader was plugged in or removed.  Also sent once on connect.
    ReaderStatus { connected: bool },

    /// A tag with a valid signature was scanned.
    TagScan { student_id: String },

    /// A requested write finished, successfully or not.
    WriteComplete { success: bool, student_id: String },

    /// A human-readable problem with the card on the reader.
    Error { message: String },
}

impl ServerMsg {
    /// Error notification for a chip the bridge cannot drive.
    pub fn unsupported_tag(chip_name: &str) -> Self {
        Self::Error {
            message: format!("Unsupported tag type: {chip_name}"),
        }
    }

    /// Error notification for a tag whose payload does not verify.
    pub fn invalid_tag() -> Self {
        Self::Error {
            message: INVALID_TAG_MESSAGE.to_owned(),
        }
    }

    /// Short variant name for log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ReaderStatus { .. } => "reader_status",
            Self::TagScan { .. } => "tag_scan",
            Self::WriteComplete { .. } => "write_complete",
            Self::Error { .. } => "error",
        }
    }
}

// ── Browser → Bridge ──────────────────────────────────────────────────────────

/// Commands a browser can send.
///
/// ```json
/// {"type":"write_tag","student_id":"42"}
/// {"type":"cancel_write"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Program the next presented card with `student_id`.
    ///
    /// A missing, `null`, or empty id is accepted by the parser and ignored
    /// by the handler.
    WriteTag {
        #[serde(default)]
        student_id: Option<String>,
    },

    /// Drop the pending write, if any.
    CancelWrite,
}

impl ClientMsg {
    /// Parses one text frame.  Returns `None` for anything that is not a
    /// known command.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
