// SPDX-License-Identifier: MIT

//! Session connection-state machine
//!
//! Tracks the current connection state and the session generation counter.
//! `observe` is a pure transition: it returns the successor tracker plus the
//! effects the dispatch thread must execute, in order. The generation
//! distinguishes successive logical sessions so that waiters registered
//! under a session that has since died are never satisfied by events
//! belonging to its replacement.

use crate::error::WaitError;
use serde::{Deserialize, Serialize};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Establishing or re-establishing the connection
    Connecting,
    /// Connected and serving requests
    Connected,
    /// Transient loss of connectivity
    Disconnected,
    /// The service discarded the session and all its ephemeral nodes
    Expired,
    /// The session was closed on purpose
    Closed,
    /// Authentication was rejected
    AuthFailed,
}

impl SessionState {
    /// Session-death states: the session is gone for good
    pub fn is_session_death(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }

    /// States that must wake every blocked waiter
    pub fn wakes_waiters(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::Disconnected
                | SessionState::Expired
                | SessionState::Closed
        )
    }

    /// The error a waiter blocked on `path` receives when this state is
    /// entered, if it is a waiter-waking state
    pub fn wake_error(self, path: &str) -> Option<WaitError> {
        match self {
            SessionState::Expired => Some(WaitError::SessionExpired {
                path: path.to_string(),
            }),
            SessionState::Closed => Some(WaitError::ConnectionClosed {
                path: path.to_string(),
            }),
            SessionState::Connecting | SessionState::Disconnected => {
                Some(WaitError::NotConnected {
                    path: path.to_string(),
                })
            }
            SessionState::Connected | SessionState::AuthFailed => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Expired => "expired",
            SessionState::Closed => "closed",
            SessionState::AuthFailed => "auth_failed",
        };
        write!(f, "{}", name)
    }
}

/// Effects the dispatch thread executes after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEffect {
    /// A new logical session began; the wait registry's generation advances
    BeginGeneration { generation: u64 },
    /// Invoke the handlers registered for the entered state, in
    /// registration order
    InvokeHandlers { state: SessionState },
    /// Wake every waiter registered under `generation` or older
    WakeWaiters {
        state: SessionState,
        generation: u64,
    },
}

/// Tracks the current state and generation of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTracker {
    current: SessionState,
    generation: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: SessionState::Connecting,
            generation: 0,
        }
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pure transition: observe one state event
    ///
    /// Handler invocation always precedes the waiter wakeup for the same
    /// event, so registered state handlers run before any blocked thread
    /// sees the death.
    pub fn observe(&self, next: SessionState) -> (StateTracker, Vec<StateEffect>) {
        let mut generation = self.generation;
        let mut effects = Vec::new();

        // Reconnecting after expiration begins a logically new session.
        // Closed is terminal, nothing reconnects after it.
        if next == SessionState::Connecting && self.current == SessionState::Expired {
            generation += 1;
            effects.push(StateEffect::BeginGeneration { generation });
        }

        effects.push(StateEffect::InvokeHandlers { state: next });

        if next.wakes_waiters() {
            effects.push(StateEffect::WakeWaiters {
                state: next,
                generation,
            });
        }

        (
            StateTracker {
                current: next,
                generation,
            },
            effects,
        )
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
