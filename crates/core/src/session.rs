// SPDX-License-Identifier: MIT

//! Session facade
//!
//! Wires a channel, the dispatch thread, the state tracker, the wait
//! registry, and the lock service into the surface application code uses.

use crate::channel::NodeChannel;
use crate::config::SessionConfig;
use crate::dispatch::{DispatchIdentity, EventDispatcher, HandlerToken};
use crate::error::{LockError, SessionError, WaitError};
use crate::event::{EventReceiver, EventSender, NodeEventKind, SessionEvent};
use crate::lock::{LockGuard, LockService};
use crate::state::{SessionState, StateTracker};
use crate::waiter::WaitRegistry;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One logical connection to the coordination service
pub struct Session {
    channel: Arc<dyn NodeChannel>,
    config: SessionConfig,
    tracker: Arc<Mutex<StateTracker>>,
    registry: Arc<WaitRegistry>,
    dispatcher: EventDispatcher,
    locks: LockService,
    sender: Mutex<Option<EventSender>>,
}

impl Session {
    /// Build a session over an already-connected channel
    ///
    /// `sender` and `events` are the two ends of the queue the transport
    /// delivers into (see [`crate::event_queue`]); the dispatch thread is
    /// spawned here and consumes `events` for the session's lifetime.
    pub fn new(
        channel: Arc<dyn NodeChannel>,
        sender: EventSender,
        events: EventReceiver,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let identity = DispatchIdentity::new();
        let tracker = Arc::new(Mutex::new(StateTracker::new()));
        let registry = Arc::new(WaitRegistry::new(identity.clone()));

        let thread_name = format!("{}-dispatch", config.name);
        let dispatcher = EventDispatcher::spawn(
            &thread_name,
            identity,
            events,
            Arc::clone(&tracker),
            Arc::clone(&registry),
        )?;

        let locks = LockService::new(
            Arc::clone(&channel),
            Arc::clone(&registry),
            config.lock_prefix.clone(),
        );

        Ok(Self {
            channel,
            config,
            tracker,
            registry,
            dispatcher,
            locks,
            sender: Mutex::new(Some(sender)),
        })
    }

    /// The underlying channel
    pub fn channel(&self) -> &Arc<dyn NodeChannel> {
        &self.channel
    }

    /// Current connection state
    pub fn state(&self) -> SessionState {
        self.tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current()
    }

    /// Current session generation
    pub fn generation(&self) -> u64 {
        self.tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .generation()
    }

    /// Whether the calling thread is this session's dispatch thread
    pub fn is_dispatch_thread(&self) -> bool {
        self.dispatcher.is_dispatch_thread()
    }

    /// Bind a handler invoked whenever the connection enters `state`
    pub fn register_state_handler<F>(&self, state: SessionState, handler: F) -> HandlerToken
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        self.dispatcher.register_state_handler(state, handler)
    }

    /// Bind a handler invoked whenever a watch fires for `path`
    pub fn register_watch_handler<F>(&self, path: impl Into<String>, handler: F) -> HandlerToken
    where
        F: Fn(&str, NodeEventKind) + Send + Sync + 'static,
    {
        self.dispatcher.register_watch_handler(path, handler)
    }

    /// Remove a previously registered handler
    pub fn deregister(&self, token: HandlerToken) -> bool {
        self.dispatcher.deregister(token)
    }

    /// Feed one transport event into the dispatch queue
    ///
    /// Delivery only enqueues; handler execution and waiter wakeups always
    /// happen on the dispatch thread, regardless of which thread delivers.
    /// Returns false if the session is already closed.
    pub fn deliver(&self, event: SessionEvent) -> bool {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::warn!("event delivered to closed session");
                false
            }
        }
    }

    /// Number of threads currently blocked waiting on `path`
    pub fn waiting_on(&self, path: &str) -> usize {
        self.registry.waiting_on(path)
    }

    /// Block until the node at `path` no longer exists
    ///
    /// Applies the configured default deadline, if any. Forbidden on the
    /// dispatch thread.
    pub fn block_until_node_deleted(&self, path: &str) -> Result<(), WaitError> {
        self.registry
            .block_until_node_deleted(self.channel.as_ref(), path, self.default_deadline())
    }

    /// Block until the node at `path` no longer exists, giving up after
    /// `deadline`
    pub fn block_until_node_deleted_with_deadline(
        &self,
        path: &str,
        deadline: Duration,
    ) -> Result<(), WaitError> {
        self.registry.block_until_node_deleted(
            self.channel.as_ref(),
            path,
            Some(Instant::now() + deadline),
        )
    }

    /// Acquire the distributed lock at `path`
    pub fn lock(&self, path: &str) -> Result<LockGuard, LockError> {
        self.locks.acquire_with_deadline(path, self.default_deadline())
    }

    /// Acquire the distributed lock at `path`, giving up after `deadline`
    pub fn lock_with_deadline(
        &self,
        path: &str,
        deadline: Duration,
    ) -> Result<LockGuard, LockError> {
        self.locks
            .acquire_with_deadline(path, Some(Instant::now() + deadline))
    }

    /// Run `action` while holding the lock at `path`, releasing on every
    /// exit path
    pub fn with_lock<T>(&self, path: &str, action: impl FnOnce() -> T) -> Result<T, LockError> {
        let guard = self.lock(path)?;
        let out = action();
        guard.release();
        Ok(out)
    }

    fn default_deadline(&self) -> Option<Instant> {
        self.config.default_deadline.map(|d| Instant::now() + d)
    }

    /// Whether `close` has run
    pub fn closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Close the session
    ///
    /// Delivers the `Closed` state (waking all remaining waiters with
    /// `ConnectionClosed`), stops the dispatch thread, and waits for it to
    /// exit. Idempotent; the join is skipped when called from a handler on
    /// the dispatch thread itself.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(tx) = sender else { return };
        let _ = tx.send(SessionEvent::State(SessionState::Closed));
        drop(tx);
        if !self.dispatcher.is_dispatch_thread() {
            self.dispatcher.join();
        }
        tracing::debug!(name = %self.config.name, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
