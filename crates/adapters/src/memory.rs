// SPDX-License-Identifier: MIT

//! In-memory coordination service for tests
//!
//! A single-process stand-in for the real service: a hierarchical node
//! store with ephemeral and sequential creation, one-shot watches, and
//! session lifecycle injection. Multiple channels connected to one hub see
//! the same tree, so contention scenarios run entirely in-process.

use roost_core::{
    ChannelError, CreateMode, EventSender, NodeEventKind, SessionEvent, SessionState,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

struct Node {
    data: Vec<u8>,
    /// Owning session for ephemeral nodes
    owner: Option<u64>,
}

struct SessionEntry {
    sender: EventSender,
    alive: bool,
}

struct HubState {
    nodes: BTreeMap<String, Node>,
    /// Per-parent counters for sequential names
    seqs: HashMap<String, u64>,
    /// One-shot watches: path -> (session, its event queue)
    watches: HashMap<String, Vec<(u64, EventSender)>>,
    sessions: HashMap<u64, SessionEntry>,
    next_session: u64,
}

/// Shared in-memory node store
#[derive(Clone)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                owner: None,
            },
        );
        Self {
            state: Arc::new(Mutex::new(HubState {
                nodes,
                seqs: HashMap::new(),
                watches: HashMap::new(),
                sessions: HashMap::new(),
                next_session: 1,
            })),
        }
    }

    /// Open a session delivering its events into `sender`
    ///
    /// Sends `Connecting` then `Connected` immediately.
    pub fn connect(&self, sender: EventSender) -> MemoryChannel {
        let mut state = self.lock();
        let id = state.next_session;
        state.next_session += 1;
        let _ = sender.send(SessionEvent::State(SessionState::Connecting));
        let _ = sender.send(SessionEvent::State(SessionState::Connected));
        state.sessions.insert(
            id,
            SessionEntry {
                sender,
                alive: true,
            },
        );
        tracing::debug!(session = id, "memory hub session connected");
        MemoryChannel {
            hub: self.clone(),
            id,
        }
    }

    /// Expire a session: discard its ephemeral nodes (firing watches) and
    /// deliver `Expired` on its event queue
    pub fn expire(&self, channel: &MemoryChannel) {
        let mut state = self.lock();
        let id = channel.id;
        let Some(entry) = state.sessions.get_mut(&id) else {
            return;
        };
        if !entry.alive {
            return;
        }
        entry.alive = false;

        // The dead session's watches never fire again.
        for watchers in state.watches.values_mut() {
            watchers.retain(|(sid, _)| *sid != id);
        }

        let orphaned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, n)| n.owner == Some(id))
            .map(|(p, _)| p.clone())
            .collect();
        for path in orphaned {
            state.nodes.remove(&path);
            fire_watches(&mut state, &path, NodeEventKind::Deleted);
        }

        if let Some(entry) = state.sessions.get(&id) {
            let _ = entry.sender.send(SessionEvent::State(SessionState::Expired));
        }
        tracing::debug!(session = id, "memory hub session expired");
    }

    /// Deliver a transient `Disconnected` on the session's event queue.
    /// The session and its ephemeral nodes survive.
    pub fn disconnect(&self, channel: &MemoryChannel) {
        let state = self.lock();
        if let Some(entry) = state.sessions.get(&channel.id) {
            let _ = entry
                .sender
                .send(SessionEvent::State(SessionState::Disconnected));
        }
    }

    /// Bring a session back after expiry or disconnection, delivering
    /// `Connecting` then `Connected`. After expiry this is a logically new
    /// session; the old ephemeral nodes stay gone.
    pub fn reconnect(&self, channel: &MemoryChannel) {
        let mut state = self.lock();
        if let Some(entry) = state.sessions.get_mut(&channel.id) {
            entry.alive = true;
            let _ = entry
                .sender
                .send(SessionEvent::State(SessionState::Connecting));
            let _ = entry
                .sender
                .send(SessionEvent::State(SessionState::Connected));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One session's view of a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryChannel {
    hub: MemoryHub,
    id: u64,
}

impl MemoryChannel {
    /// Hub-assigned session id
    pub fn session_id(&self) -> u64 {
        self.id
    }

    /// Replace a node's data, firing its armed watches
    ///
    /// Not part of the core's consumed surface; used by tests that need a
    /// watch to fire without creating or deleting the node.
    pub fn set_data(&self, path: &str, data: &[u8]) -> Result<(), ChannelError> {
        let mut state = self.hub.lock();
        ensure_alive(&state, self.id)?;
        match state.nodes.get_mut(path) {
            Some(node) => node.data = data.to_vec(),
            None => return Err(ChannelError::NoNode(path.to_string())),
        }
        fire_watches(&mut state, path, NodeEventKind::Changed);
        Ok(())
    }

    /// Read a node's data
    pub fn data(&self, path: &str) -> Result<Vec<u8>, ChannelError> {
        let state = self.hub.lock();
        ensure_alive(&state, self.id)?;
        state
            .nodes
            .get(path)
            .map(|n| n.data.clone())
            .ok_or_else(|| ChannelError::NoNode(path.to_string()))
    }
}

impl roost_core::NodeChannel for MemoryChannel {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String, ChannelError> {
        let mut state = self.hub.lock();
        ensure_alive(&state, self.id)?;

        let actual = if mode.is_sequential() {
            let parent = parent_of(path).to_string();
            let seq = state.seqs.entry(parent).or_insert(0);
            let name = format!("{}{:010}", path, *seq);
            *seq += 1;
            name
        } else {
            path.to_string()
        };

        let parent = parent_of(&actual);
        if !state.nodes.contains_key(parent) {
            return Err(ChannelError::NoNode(parent.to_string()));
        }
        if state.nodes.contains_key(&actual) {
            return Err(ChannelError::NodeExists(actual));
        }

        state.nodes.insert(
            actual.clone(),
            Node {
                data: data.to_vec(),
                owner: mode.is_ephemeral().then_some(self.id),
            },
        );
        fire_watches(&mut state, &actual, NodeEventKind::Created);
        Ok(actual)
    }

    fn exists(&self, path: &str, watch: bool) -> Result<bool, ChannelError> {
        let mut state = self.hub.lock();
        ensure_alive(&state, self.id)?;
        if watch {
            let sender = state
                .sessions
                .get(&self.id)
                .map(|e| e.sender.clone());
            if let Some(sender) = sender {
                state
                    .watches
                    .entry(path.to_string())
                    .or_default()
                    .push((self.id, sender));
            }
        }
        Ok(state.nodes.contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<(), ChannelError> {
        let mut state = self.hub.lock();
        ensure_alive(&state, self.id)?;
        if !state.nodes.contains_key(path) {
            return Err(ChannelError::NoNode(path.to_string()));
        }
        let child_prefix = child_prefix(path);
        if state.nodes.keys().any(|k| k.starts_with(&child_prefix)) {
            return Err(ChannelError::NotEmpty(path.to_string()));
        }
        state.nodes.remove(path);
        fire_watches(&mut state, path, NodeEventKind::Deleted);
        Ok(())
    }

    fn children(&self, path: &str) -> Result<Vec<String>, ChannelError> {
        let state = self.hub.lock();
        ensure_alive(&state, self.id)?;
        if !state.nodes.contains_key(path) {
            return Err(ChannelError::NoNode(path.to_string()));
        }
        let prefix = child_prefix(path);
        Ok(state
            .nodes
            .keys()
            .filter(|k| {
                k.as_str() != path
                    && k.starts_with(&prefix)
                    && !k[prefix.len()..].contains('/')
            })
            .map(|k| k[prefix.len()..].to_string())
            .collect())
    }
}

fn ensure_alive(state: &HubState, id: u64) -> Result<(), ChannelError> {
    match state.sessions.get(&id) {
        Some(entry) if entry.alive => Ok(()),
        _ => Err(ChannelError::ConnectionLoss(format!("session {}", id))),
    }
}

/// Consume and fire the one-shot watches armed on `path`
fn fire_watches(state: &mut HubState, path: &str, kind: NodeEventKind) {
    let Some(watchers) = state.watches.remove(path) else {
        return;
    };
    for (sid, sender) in watchers {
        let alive = state.sessions.get(&sid).map(|e| e.alive).unwrap_or(false);
        if alive {
            let _ = sender.send(SessionEvent::node(path, kind));
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
