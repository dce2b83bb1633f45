//! Application layer: the poll cycle, shared bridge state, and the mapping
//! between poll events and client messages.

pub mod bridge_state;
pub mod dispatch;
pub mod poll_cycle;

pub use bridge_state::{BridgeState, ErrorKind};
pub use dispatch::{apply_client_message, EventDispatcher};
pub use poll_cycle::PollEngine;
