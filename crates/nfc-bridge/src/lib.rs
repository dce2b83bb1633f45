//! nfc-bridge library crate.
//!
//! Turns a USB contactless reader into a stream of JSON events for browser
//! clients, and lets any client ask for the next card to be programmed with
//! a signed student identity.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON over WebSocket)
//!         ↕
//! [nfc-bridge]
//!   ├── domain/           Pure types: BridgeConfig, JSON messages, PollEvent
//!   ├── application/      One poll cycle, bridge state + debounce, dispatch
//!   └── infrastructure/
//!         ├── poll_loop/    Drives cycles on the blocking pool
//!         ├── ws_server/    WebSocket accept loop and broadcaster
//!         ├── pcsc_reader/  ReaderDriver backed by the `pcsc` crate
//!         └── config_file/  Optional TOML configuration
//!         ↕
//! USB reader (PC/SC)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, no frameworks.
//! - `application` depends on `domain` and `nfc-core` only.  It is fully
//!   testable with the simulated reader in `nfc_core::chip::mock`.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite`, and `pcsc`.

/// Domain layer: configuration, client messages, poll events.
pub mod domain;

/// Application layer: poll cycle state machine, shared state, dispatch.
pub mod application;

/// Infrastructure layer: poll loop, WebSocket server, PC/SC driver, config file.
pub mod infrastructure;
