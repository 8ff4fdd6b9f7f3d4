// SPDX-License-Identifier: MIT

//! Single-threaded event dispatch
//!
//! One dedicated thread per session receives every asynchronous event from
//! the transport and runs registered handlers strictly one at a time, in
//! delivery order. No other thread ever runs handlers. A handler that
//! panics is isolated and reported; the dispatch thread keeps going until
//! the session is closed.

use crate::error::SessionError;
use crate::event::{EventReceiver, NodeEventKind, SessionEvent};
use crate::state::{SessionState, StateEffect, StateTracker};
use crate::waiter::WaitRegistry;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use uuid::Uuid;

/// Callback bound to one connection state
pub type StateCallback = Arc<dyn Fn(SessionState) + Send + Sync>;
/// Callback bound to one watched path
pub type WatchCallback = Arc<dyn Fn(&str, NodeEventKind) + Send + Sync>;

/// Opaque token returned by handler registration, usable for deregistration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(Uuid);

impl HandlerToken {
    fn next() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Identity of a session's dispatch thread
///
/// Bound once by the spawned thread; any thread can then ask whether it is
/// the dispatch thread. This backs the guard that rejects blocking calls
/// made from inside handlers.
#[derive(Clone, Default)]
pub struct DispatchIdentity(Arc<OnceLock<ThreadId>>);

impl DispatchIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&self) {
        let _ = self.0.set(thread::current().id());
    }

    /// Whether the calling thread is the dispatch thread
    pub fn is_current(&self) -> bool {
        self.0.get().copied() == Some(thread::current().id())
    }
}

#[derive(Default)]
struct HandlerTable {
    state: HashMap<SessionState, Vec<(HandlerToken, StateCallback)>>,
    watch: HashMap<String, Vec<(HandlerToken, WatchCallback)>>,
}

/// Owns the dispatch thread and the session's handler table
pub struct EventDispatcher {
    handlers: Arc<Mutex<HandlerTable>>,
    identity: DispatchIdentity,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Spawn the dispatch thread consuming `events`
    ///
    /// The thread runs until it processes a `Closed` state event or the
    /// queue disconnects.
    pub fn spawn(
        thread_name: &str,
        identity: DispatchIdentity,
        events: EventReceiver,
        tracker: Arc<Mutex<StateTracker>>,
        registry: Arc<WaitRegistry>,
    ) -> Result<Self, SessionError> {
        let handlers: Arc<Mutex<HandlerTable>> = Arc::default();

        let worker_handlers = Arc::clone(&handlers);
        let worker_identity = identity.clone();
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                worker_identity.bind();
                dispatch_loop(&events, &worker_handlers, &tracker, &registry);
            })?;

        Ok(Self {
            handlers,
            identity,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn identity(&self) -> &DispatchIdentity {
        &self.identity
    }

    /// Whether the calling thread is this session's dispatch thread
    pub fn is_dispatch_thread(&self) -> bool {
        self.identity.is_current()
    }

    /// Bind a handler invoked whenever the connection enters `state`
    pub fn register_state_handler<F>(&self, state: SessionState, handler: F) -> HandlerToken
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        let token = HandlerToken::next();
        let mut table = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        table
            .state
            .entry(state)
            .or_default()
            .push((token, Arc::new(handler)));
        token
    }

    /// Bind a handler invoked whenever a watch fires for `path`
    pub fn register_watch_handler<F>(&self, path: impl Into<String>, handler: F) -> HandlerToken
    where
        F: Fn(&str, NodeEventKind) + Send + Sync + 'static,
    {
        let token = HandlerToken::next();
        let mut table = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        table
            .watch
            .entry(path.into())
            .or_default()
            .push((token, Arc::new(handler)));
        token
    }

    /// Remove a previously registered handler. Returns whether it existed.
    pub fn deregister(&self, token: HandlerToken) -> bool {
        let mut table = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let mut found = false;
        for handlers in table.state.values_mut() {
            let before = handlers.len();
            handlers.retain(|(t, _)| *t != token);
            found |= handlers.len() != before;
        }
        for handlers in table.watch.values_mut() {
            let before = handlers.len();
            handlers.retain(|(t, _)| *t != token);
            found |= handlers.len() != before;
        }
        found
    }

    /// Wait for the dispatch thread to exit. Must not be called from the
    /// dispatch thread itself.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("dispatch thread terminated abnormally");
            }
        }
    }
}

fn dispatch_loop(
    events: &EventReceiver,
    handlers: &Mutex<HandlerTable>,
    tracker: &Mutex<StateTracker>,
    registry: &WaitRegistry,
) {
    for event in events.iter() {
        match event {
            SessionEvent::State(next) => {
                let effects = {
                    let mut tracker = tracker.lock().unwrap_or_else(|e| e.into_inner());
                    let (updated, effects) = tracker.observe(next);
                    *tracker = updated;
                    effects
                };
                tracing::debug!(state = %next, "session state");
                for effect in effects {
                    match effect {
                        StateEffect::BeginGeneration { generation } => {
                            registry.begin_generation(generation);
                        }
                        StateEffect::InvokeHandlers { state } => {
                            run_state_handlers(handlers, state);
                        }
                        StateEffect::WakeWaiters { state, generation } => {
                            registry.broadcast_death(state, generation);
                        }
                    }
                }
                if next == SessionState::Closed {
                    break;
                }
            }
            SessionEvent::Node { path, kind } => {
                run_watch_handlers(handlers, &path, kind);
                registry.notify_path(&path);
            }
        }
    }
    tracing::debug!("dispatch thread exiting");
}

fn run_state_handlers(handlers: &Mutex<HandlerTable>, state: SessionState) {
    // Snapshot under the lock, invoke outside it, so handlers can register
    // or deregister without deadlocking.
    let snapshot: Vec<StateCallback> = {
        let table = handlers.lock().unwrap_or_else(|e| e.into_inner());
        table
            .state
            .get(&state)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    };
    for handler in snapshot {
        if catch_unwind(AssertUnwindSafe(|| handler(state))).is_err() {
            tracing::error!(state = %state, "state handler panicked");
        }
    }
}

fn run_watch_handlers(handlers: &Mutex<HandlerTable>, path: &str, kind: NodeEventKind) {
    let snapshot: Vec<WatchCallback> = {
        let table = handlers.lock().unwrap_or_else(|e| e.into_inner());
        table
            .watch
            .get(path)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    };
    for handler in snapshot {
        if catch_unwind(AssertUnwindSafe(|| handler(path, kind))).is_err() {
            tracing::error!(path, "watch handler panicked");
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
