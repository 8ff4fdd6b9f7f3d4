// SPDX-License-Identifier: MIT

//! Events delivered by a transport into the dispatch thread

use crate::state::SessionState;

/// What changed at a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Created,
    Deleted,
    Changed,
}

/// One asynchronous event from the coordination service
///
/// Transports produce these in delivery order; the dispatch thread consumes
/// them strictly serially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection state change
    State(SessionState),
    /// A one-shot watch fired for `path`
    Node { path: String, kind: NodeEventKind },
}

impl SessionEvent {
    pub fn node(path: impl Into<String>, kind: NodeEventKind) -> Self {
        SessionEvent::Node {
            path: path.into(),
            kind,
        }
    }
}

/// Sender half of a session's event queue
pub type EventSender = crossbeam_channel::Sender<SessionEvent>;
/// Receiver half of a session's event queue
pub type EventReceiver = crossbeam_channel::Receiver<SessionEvent>;

/// Create the event queue connecting a transport to a session's dispatcher
pub fn event_queue() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}
