//! Domain layer for nfc-bridge.
//!
//! Pure types with no dependencies on I/O, networking, or the reader:
//!
//! - Configuration ([`BridgeConfig`])
//! - The JSON "language" between browser and bridge ([`ServerMsg`], [`ClientMsg`])
//! - The outcome of one poll cycle ([`PollEvent`])

pub mod config;
pub mod events;
pub mod messages;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::BridgeConfig` instead of the longer path.
pub use config::{parse_mifare_key, BridgeConfig, InvalidKeyError, DEFAULT_SECRET};
pub use events::PollEvent;
pub use messages::{ClientMsg, ServerMsg};
