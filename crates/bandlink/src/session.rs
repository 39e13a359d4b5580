//! Session lifecycle state machine
//!
//! One `SessionTracker` per connected device. Which commands are legal in
//! which state is decided here, once; request handlers never duplicate the
//! check.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use bandlink_proto::Command;

use crate::error::ProtocolError;

/// Connection lifecycle of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Transport link established, identity not yet verified.
    Connected,
    /// Identity handshake succeeded.
    Identified,
    /// Session negotiation succeeded; ordinary requests are legal.
    Ready,
    /// A bulk transfer owns the line.
    Transferring,
    Closing,
}

impl SessionState {
    /// Central legality check for issuing `command` in this state.
    pub fn allows(self, command: Command) -> bool {
        match self {
            SessionState::Disconnected | SessionState::Closing => false,
            SessionState::Connected => {
                matches!(command, Command::ACK | Command::IS_DEVICE_PAIRED)
            }
            SessionState::Identified => {
                matches!(command, Command::ACK | Command::SESSION_START)
            }
            // The command table is open-ended, so Ready admits everything
            // except re-running the handshake.
            SessionState::Ready => {
                !matches!(command, Command::IS_DEVICE_PAIRED | Command::SESSION_START)
            }
            SessionState::Transferring => matches!(
                command,
                Command::ACK | Command::GET_LOG_FILE | Command::SEND_STORED_DATA
            ),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connected => "Connected",
            SessionState::Identified => "Identified",
            SessionState::Ready => "Ready",
            SessionState::Transferring => "Transferring",
            SessionState::Closing => "Closing",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and validates transitions.
pub(crate) struct SessionTracker {
    state: RwLock<SessionState>,
    /// Set when the transport dropped out from under us, so queued callers
    /// fail with `ConnectionLost` rather than `InvalidState`.
    lost: AtomicBool,
}

impl SessionTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Connected),
            lost: AtomicBool::new(false),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        *self.state.read()
    }

    pub(crate) fn link_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Fail fast if `command` is not legal right now.
    pub(crate) fn ensure_allows(&self, command: Command) -> Result<(), ProtocolError> {
        let state = self.current();
        if state == SessionState::Disconnected && self.link_lost() {
            return Err(ProtocolError::ConnectionLost);
        }
        if !state.allows(command) {
            return Err(ProtocolError::InvalidState { state, command });
        }
        Ok(())
    }

    pub(crate) fn identified(&self) {
        self.advance(SessionState::Connected, SessionState::Identified);
    }

    pub(crate) fn ready(&self) {
        self.advance(SessionState::Identified, SessionState::Ready);
    }

    /// Ready -> Transferring, or `InvalidState` without touching the state.
    pub(crate) fn begin_transfer(&self, command: Command) -> Result<(), ProtocolError> {
        let mut state = self.state.write();
        if *state != SessionState::Ready {
            return Err(ProtocolError::InvalidState {
                state: *state,
                command,
            });
        }
        *state = SessionState::Transferring;
        debug!(from = %SessionState::Ready, to = %*state, "session state");
        Ok(())
    }

    /// Transferring -> Ready. A transfer racing a disconnect is a no-op.
    pub(crate) fn end_transfer(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Transferring {
            *state = SessionState::Ready;
            debug!(from = %SessionState::Transferring, to = %*state, "session state");
        }
    }

    /// Begin an orderly shutdown. Idempotent.
    pub(crate) fn closing(&self) {
        let mut state = self.state.write();
        match *state {
            SessionState::Disconnected | SessionState::Closing => {}
            from => {
                *state = SessionState::Closing;
                debug!(%from, to = %SessionState::Closing, "session state");
            }
        }
    }

    /// Terminal transition. `lost` marks an unexpected drop rather than an
    /// orderly close.
    pub(crate) fn disconnected(&self, lost: bool) {
        let mut state = self.state.write();
        if *state != SessionState::Disconnected {
            debug!(from = %*state, to = %SessionState::Disconnected, "session state");
            *state = SessionState::Disconnected;
        }
        if lost {
            self.lost.store(true, Ordering::SeqCst);
        }
    }

    fn advance(&self, from: SessionState, to: SessionState) {
        let mut state = self.state.write();
        if *state == from {
            debug!(%from, %to, "session state");
            *state = to;
        } else {
            warn!(current = %*state, %from, %to, "skipping stale session transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_commands_gated_by_state() {
        assert!(SessionState::Connected.allows(Command::IS_DEVICE_PAIRED));
        assert!(!SessionState::Connected.allows(Command::GET_CONFIG));
        assert!(!SessionState::Connected.allows(Command::GET_LOG_FILE));

        assert!(SessionState::Identified.allows(Command::SESSION_START));
        assert!(!SessionState::Identified.allows(Command::IS_DEVICE_PAIRED));

        assert!(SessionState::Ready.allows(Command::GET_CONFIG));
        assert!(SessionState::Ready.allows(Command(0x00F7))); // unmapped command
        assert!(!SessionState::Ready.allows(Command::SESSION_START));

        assert!(SessionState::Transferring.allows(Command::GET_LOG_FILE));
        assert!(!SessionState::Transferring.allows(Command::GET_CONFIG));

        assert!(!SessionState::Disconnected.allows(Command::ACK));
        assert!(!SessionState::Closing.allows(Command::GET_CONFIG));
    }

    #[test]
    fn begin_transfer_requires_ready() {
        let tracker = SessionTracker::new();
        let err = tracker.begin_transfer(Command::GET_LOG_FILE).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidState {
                state: SessionState::Connected,
                ..
            }
        ));
        // The failed attempt must not move the state.
        assert_eq!(tracker.current(), SessionState::Connected);

        tracker.identified();
        tracker.ready();
        tracker.begin_transfer(Command::GET_LOG_FILE).unwrap();
        assert_eq!(tracker.current(), SessionState::Transferring);
        tracker.end_transfer();
        assert_eq!(tracker.current(), SessionState::Ready);
    }

    #[test]
    fn lost_link_turns_into_connection_lost() {
        let tracker = SessionTracker::new();
        tracker.identified();
        tracker.ready();
        tracker.disconnected(true);

        assert!(matches!(
            tracker.ensure_allows(Command::GET_CONFIG),
            Err(ProtocolError::ConnectionLost)
        ));
    }

    #[test]
    fn orderly_close_is_invalid_state_not_lost() {
        let tracker = SessionTracker::new();
        tracker.closing();
        tracker.disconnected(false);

        assert!(matches!(
            tracker.ensure_allows(Command::GET_CONFIG),
            Err(ProtocolError::InvalidState { .. })
        ));
    }
}
