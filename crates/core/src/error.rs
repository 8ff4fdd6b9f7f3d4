// SPDX-License-Identifier: MIT

//! Error types for the coordination core

use thiserror::Error;

/// Operation-level errors surfaced by a [`crate::NodeChannel`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("no node: {0}")]
    NoNode(String),
    #[error("node has children: {0}")]
    NotEmpty(String),
    #[error("connection lost: {0}")]
    ConnectionLoss(String),
}

/// Errors raised by the blocking wait primitive
///
/// A blocked caller sees exactly one of these; lock retry logic branches
/// on the kind, so session-death variants carry the specific death state
/// rather than a generic interruption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// A blocking call was made on the event dispatch thread. Programmer
    /// error, never retried.
    #[error("blocking call on the event dispatch thread")]
    EventDispatchThread,
    /// The session expired while waiting; ephemeral state is gone and the
    /// caller needs a new session to retry.
    #[error("session expired while waiting on {path}")]
    SessionExpired { path: String },
    /// Transient disconnection observed while waiting; retryable once
    /// reconnected.
    #[error("not connected while waiting on {path}")]
    NotConnected { path: String },
    /// The session was closed on purpose; not retryable.
    #[error("connection closed while waiting on {path}")]
    ConnectionClosed { path: String },
    /// Caller-supplied deadline elapsed. Distinct from session death.
    #[error("deadline elapsed while waiting on {path}")]
    Timeout { path: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl WaitError {
    /// Whether this wakeup was caused by session death
    pub fn is_session_death(&self) -> bool {
        matches!(
            self,
            WaitError::SessionExpired { .. }
                | WaitError::NotConnected { .. }
                | WaitError::ConnectionClosed { .. }
        )
    }
}

/// Errors from lock acquisition and release
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from session construction and lifecycle
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
