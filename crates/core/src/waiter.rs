// SPDX-License-Identifier: MIT

//! Blocking waits on path conditions
//!
//! Any non-dispatch thread can block until a predicate on a path becomes
//! true or the session dies, whichever happens first. A single mutex guards
//! both the predicate check (which arms the watch) and waiter registration,
//! so a watch that fires immediately after arming cannot be missed: the
//! dispatch thread's `notify_path` contends on the same mutex and sets the
//! waiter's wake flag before the waiter can re-check it.
//!
//! Wakeups are typed results written into the waiter's cell under the
//! mutex, never exceptions thrown across threads. Each cell resolves
//! exactly once: condition met, session death, or deadline.

use crate::channel::NodeChannel;
use crate::dispatch::DispatchIdentity;
use crate::error::{ChannelError, WaitError};
use crate::state::SessionState;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

struct WaitCell {
    path: String,
    /// Session generation at registration time
    generation: u64,
    /// The watched path fired since the last predicate check
    fired: bool,
    /// Session death observed for this cell's generation or newer
    died: Option<SessionState>,
}

struct RegistryState {
    generation: u64,
    next_cell: u64,
    cells: HashMap<u64, WaitCell>,
    /// Terminal death already broadcast for the current generation. Waits
    /// started after the fact fail immediately instead of blocking on a
    /// session that will never signal again.
    dead: Option<SessionState>,
}

/// Registry of threads blocked on path conditions
pub struct WaitRegistry {
    identity: DispatchIdentity,
    state: Mutex<RegistryState>,
    wakeups: Condvar,
}

impl WaitRegistry {
    pub fn new(identity: DispatchIdentity) -> Self {
        Self {
            identity,
            state: Mutex::new(RegistryState {
                generation: 0,
                next_cell: 0,
                cells: HashMap::new(),
                dead: None,
            }),
            wakeups: Condvar::new(),
        }
    }

    /// A new logical session began; waiters registered from now on belong
    /// to `generation`
    pub fn begin_generation(&self, generation: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.generation = generation;
        state.dead = None;
        tracing::debug!(generation, "new session generation");
    }

    /// Resolve every waiter registered under `generation` or older with the
    /// error for `state`. Invoked on the dispatch thread while a death
    /// state event is being processed.
    pub fn broadcast_death(&self, state: SessionState, generation: u64) {
        let mut registry = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_session_death() && generation >= registry.generation {
            registry.dead = Some(state);
        }
        let mut woken = 0usize;
        for cell in registry.cells.values_mut() {
            if cell.died.is_none() && cell.generation <= generation {
                cell.died = Some(state);
                woken += 1;
            }
        }
        if woken > 0 {
            tracing::debug!(state = %state, generation, woken, "waking blocked waiters");
        }
        self.wakeups.notify_all();
    }

    /// The watch for `path` fired; wake its waiters so they re-evaluate
    pub fn notify_path(&self, path: &str) {
        let mut registry = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for cell in registry.cells.values_mut() {
            if cell.path == path {
                cell.fired = true;
            }
        }
        self.wakeups.notify_all();
    }

    /// Number of threads currently blocked on `path`
    pub fn waiting_on(&self, path: &str) -> usize {
        let registry = self.state.lock().unwrap_or_else(|e| e.into_inner());
        registry.cells.values().filter(|c| c.path == path).count()
    }

    /// Block the calling thread until `predicate` is true, the session
    /// dies, or `deadline` passes
    ///
    /// The predicate is responsible for arming the one-shot watch on `path`
    /// each time it runs; it is always evaluated under the registry mutex.
    /// Fails immediately with `EventDispatchThread` on the dispatch thread.
    pub fn block_until<F>(
        &self,
        path: &str,
        deadline: Option<Instant>,
        mut predicate: F,
    ) -> Result<(), WaitError>
    where
        F: FnMut() -> Result<bool, ChannelError>,
    {
        if self.identity.is_current() {
            return Err(WaitError::EventDispatchThread);
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // The condition may already hold; nothing to register then.
        if predicate()? {
            return Ok(());
        }

        // The session died before this thread got here; a cell registered
        // now would never be resolved.
        if let Some(death) = state.dead {
            return Err(death.wake_error(path).unwrap_or(WaitError::NotConnected {
                path: path.to_string(),
            }));
        }

        let id = state.next_cell;
        state.next_cell += 1;
        let generation = state.generation;
        state.cells.insert(
            id,
            WaitCell {
                path: path.to_string(),
                generation,
                fired: false,
                died: None,
            },
        );
        tracing::trace!(path, generation, "thread blocked");

        let result = loop {
            if let Some(death) = state.cells.get(&id).and_then(|c| c.died) {
                break Err(death
                    .wake_error(path)
                    .unwrap_or(WaitError::NotConnected {
                        path: path.to_string(),
                    }));
            }

            let fired = state
                .cells
                .get_mut(&id)
                .map(|c| std::mem::take(&mut c.fired))
                .unwrap_or(false);
            if fired {
                match predicate() {
                    Ok(true) => break Ok(()),
                    Ok(false) => {
                        // Watch re-armed by the predicate; keep waiting.
                    }
                    Err(e) => break Err(WaitError::Channel(e)),
                }
            }

            state = match deadline {
                None => self.wakeups.wait(state).unwrap_or_else(|e| e.into_inner()),
                Some(when) => {
                    let now = Instant::now();
                    if now >= when {
                        break Err(WaitError::Timeout {
                            path: path.to_string(),
                        });
                    }
                    let (guard, _) = self
                        .wakeups
                        .wait_timeout(state, when - now)
                        .unwrap_or_else(|e| e.into_inner());
                    guard
                }
            };
        };

        state.cells.remove(&id);
        tracing::trace!(path, ok = result.is_ok(), "thread woke");
        result
    }

    /// Block until the node at `path` no longer exists
    pub fn block_until_node_deleted(
        &self,
        channel: &dyn NodeChannel,
        path: &str,
        deadline: Option<Instant>,
    ) -> Result<(), WaitError> {
        self.block_until(path, deadline, || Ok(!channel.exists(path, true)?))
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
