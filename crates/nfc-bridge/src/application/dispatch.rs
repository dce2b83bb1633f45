//! Turns poll events into browser notifications, and browser commands into
//! state changes.
//!
//! Both directions are pure with respect to I/O: they read and update
//! [`BridgeState`] and return what should be sent, leaving transport to the
//! infrastructure layer.

use std::time::Instant;

use nfc_core::payload::SEPARATOR;
use tracing::{debug, error, info, warn};

use crate::application::bridge_state::{BridgeState, ErrorKind};
use crate::domain::{ClientMsg, PollEvent, ServerMsg};

/// Per-loop dispatcher.  Remembers the last reported reader connectivity so
/// that only transitions are broadcast.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    was_connected: Option<bool>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps one poll event to the messages to broadcast, in order.
    pub fn handle(&mut self, event: &PollEvent, state: &BridgeState) -> Vec<ServerMsg> {
        self.handle_at(event, state, Instant::now())
    }

    /// [`handle`](Self::handle) with an explicit clock for the debounce checks.
    pub fn handle_at(
        &mut self,
        event: &PollEvent,
        state: &BridgeState,
        now: Instant,
    ) -> Vec<ServerMsg> {
        let mut out = Vec::new();

        let connected = event.reader_present();
        if self.was_connected != Some(connected) {
            if connected {
                info!("reader connected");
            } else {
                info!("reader disconnected");
            }
            state.set_reader_connected(connected);
            self.was_connected = Some(connected);
            out.push(ServerMsg::ReaderStatus { connected });
        }

        match event {
            PollEvent::NoReader | PollEvent::NoCard | PollEvent::EmptyTag => {}

            PollEvent::WriteResult { success, identity } => {
                state.clear_error();
                if *success {
                    info!("write complete for {identity}");
                } else {
                    error!("write failed for {identity}");
                }
                out.push(ServerMsg::WriteComplete {
                    success: *success,
                    student_id: identity.clone(),
                });
            }

            PollEvent::ValidTag { identity } => {
                state.clear_error();
                if state.should_debounce_scan_at(identity, now) {
                    debug!("scan of {identity} debounced");
                } else {
                    info!("tag scanned: {identity}");
                    out.push(ServerMsg::TagScan {
                        student_id: identity.clone(),
                    });
                }
            }

            PollEvent::InvalidTag { raw } => {
                if !state.should_debounce_error_at(ErrorKind::InvalidTag, now) {
                    warn!("invalid or unsigned tag: {raw:?}");
                    out.push(ServerMsg::invalid_tag());
                }
            }

            PollEvent::UnsupportedTag { chip_name } => {
                if !state.should_debounce_error_at(ErrorKind::UnsupportedTag, now) {
                    warn!("unsupported tag type: {chip_name}");
                    out.push(ServerMsg::unsupported_tag(chip_name));
                }
            }
        }

        out
    }
}

/// Applies one browser command to the shared state.
///
/// Returns a reply for the requesting client only when the command is
/// refused outright. An identity containing the payload separator is refused
/// because its signed payload could never verify.
pub fn apply_client_message(msg: ClientMsg, state: &BridgeState) -> Option<ServerMsg> {
    match msg {
        ClientMsg::WriteTag {
            student_id: Some(identity),
        } if identity.contains(SEPARATOR) => {
            warn!("write for {identity:?} refused: identity contains '{SEPARATOR}'");
            Some(ServerMsg::WriteComplete {
                success: false,
                student_id: identity,
            })
        }
        ClientMsg::WriteTag {
            student_id: Some(identity),
        } if !identity.is_empty() => {
            info!("write requested for {identity}");
            if let Some(previous) = state.set_pending_write(identity) {
                debug!("replaced pending write for {previous}");
            }
            None
        }
        ClientMsg::WriteTag { .. } => {
            debug!("write_tag without student_id ignored");
            None
        }
        ClientMsg::CancelWrite => {
            if let Some(identity) = state.cancel_pending_write() {
                info!("write for {identity} cancelled");
            }
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(3);

    fn valid(id: &str) -> PollEvent {
        PollEvent::ValidTag {
            identity: id.into(),
        }
    }

    fn invalid() -> PollEvent {
        PollEvent::InvalidTag {
            raw: "forged:00".into(),
        }
    }

    /// Dispatcher that has already reported a connected reader.
    fn primed(state: &BridgeState, now: Instant) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.handle_at(&PollEvent::NoCard, state, now);
        dispatcher
    }

    // ── Connectivity ──────────────────────────────────────────────────────────

    #[test]
    fn test_first_cycle_always_reports_status() {
        let state = BridgeState::new(WINDOW);
        let mut dispatcher = EventDispatcher::new();

        let out = dispatcher.handle(&PollEvent::NoReader, &state);

        assert_eq!(out, vec![ServerMsg::ReaderStatus { connected: false }]);
        assert!(!state.reader_connected());
    }

    #[test]
    fn test_status_only_on_transition() {
        // Arrange
        let state = BridgeState::new(WINDOW);
        let mut dispatcher = EventDispatcher::new();
        let now = Instant::now();

        // Act
        let first = dispatcher.handle_at(&PollEvent::NoCard, &state, now);
        let repeat = dispatcher.handle_at(&PollEvent::EmptyTag, &state, now);
        let unplugged = dispatcher.handle_at(&PollEvent::NoReader, &state, now);

        // Assert
        assert_eq!(first, vec![ServerMsg::ReaderStatus { connected: true }]);
        assert!(repeat.is_empty());
        assert_eq!(unplugged, vec![ServerMsg::ReaderStatus { connected: false }]);
        assert!(!state.reader_connected());
    }

    #[test]
    fn test_status_precedes_event_message() {
        let state = BridgeState::new(WINDOW);
        let mut dispatcher = EventDispatcher::new();

        let out = dispatcher.handle(&valid("42"), &state);

        assert_eq!(
            out,
            vec![
                ServerMsg::ReaderStatus { connected: true },
                ServerMsg::TagScan {
                    student_id: "42".into()
                },
            ]
        );
    }

    // ── Scans ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_repeat_scan_within_window_is_suppressed() {
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);

        assert_eq!(dispatcher.handle_at(&valid("42"), &state, t0).len(), 1);
        assert!(dispatcher
            .handle_at(&valid("42"), &state, t0 + Duration::from_secs(1))
            .is_empty());
        assert_eq!(
            dispatcher.handle_at(&valid("42"), &state, t0 + WINDOW).len(),
            1
        );
    }

    #[test]
    fn test_valid_tag_clears_error_debounce() {
        // Arrange
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);
        dispatcher.handle_at(&invalid(), &state, t0);

        // Act
        dispatcher.handle_at(&valid("42"), &state, t0);
        let out = dispatcher.handle_at(&invalid(), &state, t0);

        // Assert
        assert_eq!(out, vec![ServerMsg::invalid_tag()]);
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    #[test]
    fn test_invalid_tag_debounced() {
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);

        assert_eq!(
            dispatcher.handle_at(&invalid(), &state, t0),
            vec![ServerMsg::invalid_tag()]
        );
        assert!(dispatcher.handle_at(&invalid(), &state, t0).is_empty());
    }

    #[test]
    fn test_unsupported_tag_message_and_debounce() {
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);
        let event = PollEvent::UnsupportedTag {
            chip_name: "ICODE SLI".into(),
        };

        assert_eq!(
            dispatcher.handle_at(&event, &state, t0),
            vec![ServerMsg::unsupported_tag("ICODE SLI")]
        );
        assert!(dispatcher.handle_at(&event, &state, t0).is_empty());
    }

    #[test]
    fn test_quiet_events_emit_nothing() {
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);

        for event in [PollEvent::NoCard, PollEvent::EmptyTag] {
            assert!(dispatcher.handle_at(&event, &state, t0).is_empty());
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    #[test]
    fn test_write_result_always_reported_and_clears_error() {
        // Arrange
        let state = BridgeState::new(WINDOW);
        let t0 = Instant::now();
        let mut dispatcher = primed(&state, t0);
        dispatcher.handle_at(&invalid(), &state, t0);
        let failed = PollEvent::WriteResult {
            success: false,
            identity: "42".into(),
        };

        // Act
        let first = dispatcher.handle_at(&failed, &state, t0);
        let second = dispatcher.handle_at(&failed, &state, t0);
        let after = dispatcher.handle_at(&invalid(), &state, t0);

        // Assert
        let expected = vec![ServerMsg::WriteComplete {
            success: false,
            student_id: "42".into(),
        }];
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(after, vec![ServerMsg::invalid_tag()]);
    }

    // ── Client commands ───────────────────────────────────────────────────────

    #[test]
    fn test_write_tag_sets_pending_write() {
        let state = BridgeState::new(WINDOW);

        let reply = apply_client_message(
            ClientMsg::WriteTag {
                student_id: Some("42".into()),
            },
            &state,
        );

        assert_eq!(reply, None);
        assert_eq!(state.pending_write(), Some("42".into()));
    }

    #[test]
    fn test_write_tag_with_separator_is_refused() {
        // Arrange
        let state = BridgeState::new(WINDOW);
        state.set_pending_write("7");

        // Act
        let reply = apply_client_message(
            ClientMsg::WriteTag {
                student_id: Some("class:42".into()),
            },
            &state,
        );

        // Assert
        assert_eq!(
            reply,
            Some(ServerMsg::WriteComplete {
                success: false,
                student_id: "class:42".into(),
            })
        );
        assert_eq!(state.pending_write(), Some("7".into()));
    }

    #[test]
    fn test_write_tag_without_id_is_ignored() {
        let state = BridgeState::new(WINDOW);
        state.set_pending_write("7");

        let missing = apply_client_message(ClientMsg::WriteTag { student_id: None }, &state);
        let empty = apply_client_message(
            ClientMsg::WriteTag {
                student_id: Some(String::new()),
            },
            &state,
        );

        assert_eq!(missing, None);
        assert_eq!(empty, None);
        assert_eq!(state.pending_write(), Some("7".into()));
    }

    #[test]
    fn test_cancel_write_clears_pending_write() {
        let state = BridgeState::new(WINDOW);
        state.set_pending_write("42");

        apply_client_message(ClientMsg::CancelWrite, &state);
        apply_client_message(ClientMsg::CancelWrite, &state);

        assert_eq!(state.pending_write(), None);
    }
}
