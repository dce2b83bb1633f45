//! Process-wide state shared between client sessions and the poll loop.
//!
//! Ownership of each field is split by writer:
//!
//! | Field              | Written by                       |
//! |--------------------|----------------------------------|
//! | pending write      | sessions set/clear, cycle takes  |
//! | reader connected   | poll loop (dispatch)             |
//! | scan/error windows | poll loop (dispatch)             |
//!
//! Every critical section is a few instructions long and never spans an
//! `.await`, so plain `std::sync` primitives are used.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Error notifications that are debounced together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTag,
    UnsupportedTag,
}

/// Remembers the last key and when it was let through.
#[derive(Debug)]
struct Debounce<K> {
    last: Option<(K, Instant)>,
}

impl<K: PartialEq> Debounce<K> {
    const fn new() -> Self {
        Self { last: None }
    }

    /// Returns `true` to suppress `key`.  A key that is let through becomes
    /// the new reference; a suppressed one does not extend the window.
    fn suppress(&mut self, key: K, now: Instant, window: Duration) -> bool {
        if let Some((last, at)) = &self.last {
            if *last == key && now.saturating_duration_since(*at) < window {
                return true;
            }
        }
        self.last = Some((key, now));
        false
    }

    fn clear(&mut self) {
        self.last = None;
    }
}

/// Shared bridge state.  Wrap in an `Arc` and hand a clone to every task.
#[derive(Debug)]
pub struct BridgeState {
    debounce_window: Duration,
    pending_write: Mutex<Option<String>>,
    reader_connected: AtomicBool,
    last_scan: Mutex<Debounce<String>>,
    last_error: Mutex<Debounce<ErrorKind>>,
}

impl BridgeState {
    /// Creates empty state with the given debounce window.
    pub fn new(debounce_window: Duration) -> Self {
        Self {
            debounce_window,
            pending_write: Mutex::new(None),
            reader_connected: AtomicBool::new(false),
            last_scan: Mutex::new(Debounce::new()),
            last_error: Mutex::new(Debounce::new()),
        }
    }

    // ── Pending write ─────────────────────────────────────────────────────────

    /// Requests that the next card be written with `identity`.
    ///
    /// Replaces any earlier request and returns it.
    pub fn set_pending_write(&self, identity: impl Into<String>) -> Option<String> {
        lock(&self.pending_write).replace(identity.into())
    }

    /// Drops the pending request and returns it.
    pub fn cancel_pending_write(&self) -> Option<String> {
        lock(&self.pending_write).take()
    }

    /// Removes and returns the pending request.  Used by the poll cycle,
    /// which consumes the request whether or not the write succeeds.
    pub fn take_pending_write(&self) -> Option<String> {
        lock(&self.pending_write).take()
    }

    /// Returns the pending request without consuming it.
    pub fn pending_write(&self) -> Option<String> {
        lock(&self.pending_write).clone()
    }

    // ── Reader connectivity ───────────────────────────────────────────────────

    pub fn set_reader_connected(&self, connected: bool) {
        self.reader_connected.store(connected, Ordering::Relaxed);
    }

    pub fn reader_connected(&self) -> bool {
        self.reader_connected.load(Ordering::Relaxed)
    }

    // ── Debounce ──────────────────────────────────────────────────────────────

    /// `true` if a scan of `identity` should be suppressed now.
    pub fn should_debounce_scan(&self, identity: &str) -> bool {
        self.should_debounce_scan_at(identity, Instant::now())
    }

    /// [`should_debounce_scan`](Self::should_debounce_scan) at an explicit instant.
    pub fn should_debounce_scan_at(&self, identity: &str, now: Instant) -> bool {
        lock(&self.last_scan).suppress(identity.to_owned(), now, self.debounce_window)
    }

    /// `true` if an error notification of `kind` should be suppressed now.
    pub fn should_debounce_error(&self, kind: ErrorKind) -> bool {
        self.should_debounce_error_at(kind, Instant::now())
    }

    /// [`should_debounce_error`](Self::should_debounce_error) at an explicit instant.
    pub fn should_debounce_error_at(&self, kind: ErrorKind, now: Instant) -> bool {
        lock(&self.last_error).suppress(kind, now, self.debounce_window)
    }

    /// Forgets the last error so the next one is reported immediately.
    pub fn clear_error(&self) {
        lock(&self.last_error).clear();
    }
}

/// A poisoned lock only means another thread panicked mid-update of a plain
/// value; the value itself is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
