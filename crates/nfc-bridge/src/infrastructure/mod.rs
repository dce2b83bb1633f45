//! Infrastructure layer for nfc-bridge.
//!
//! Everything that touches the outside world lives here: the PC/SC reader,
//! the WebSocket listener, the config file, and the task that drives the
//! poll cycle.
//!
//! # What does NOT belong here?
//!
//! - Card classification and debounce rules (application layer)
//! - Message type definitions (domain layer)

pub mod config_file;
pub mod pcsc_reader;
pub mod poll_loop;
pub mod ws_server;

pub use config_file::{ConfigError, FileConfig};
pub use pcsc_reader::PcscDriver;
pub use poll_loop::run_poll_loop;
pub use ws_server::{bind, run_server};
