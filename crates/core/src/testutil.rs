// SPDX-License-Identifier: MIT

//! Minimal in-process channel for unit tests
//!
//! A bare node tree with sequential-name support. It produces no events;
//! tests drive the wait registry directly, which keeps the coupling between
//! channel calls and notifications explicit.

use crate::channel::{CreateMode, NodeChannel};
use crate::error::ChannelError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
struct TreeState {
    nodes: BTreeMap<String, Vec<u8>>,
    seqs: HashMap<String, u64>,
    armed: Vec<String>,
}

#[derive(Default)]
pub struct TestTree {
    state: Mutex<TreeState>,
}

impl TestTree {
    pub fn new() -> Self {
        let tree = Self::default();
        tree.lock().nodes.insert("/".to_string(), Vec::new());
        tree
    }

    /// Paths on which an exists-watch was armed, in order
    pub fn armed_watches(&self) -> Vec<String> {
        self.lock().armed.clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NodeChannel for TestTree {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String, ChannelError> {
        let mut state = self.lock();
        let actual = if mode.is_sequential() {
            let seq = state.seqs.entry(parent_of(path).to_string()).or_insert(0);
            let name = format!("{}{:010}", path, *seq);
            *seq += 1;
            name
        } else {
            path.to_string()
        };
        if !state.nodes.contains_key(parent_of(&actual)) {
            return Err(ChannelError::NoNode(parent_of(&actual).to_string()));
        }
        if state.nodes.contains_key(&actual) {
            return Err(ChannelError::NodeExists(actual));
        }
        state.nodes.insert(actual.clone(), data.to_vec());
        Ok(actual)
    }

    fn exists(&self, path: &str, watch: bool) -> Result<bool, ChannelError> {
        let mut state = self.lock();
        if watch {
            state.armed.push(path.to_string());
        }
        Ok(state.nodes.contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if state.nodes.remove(path).is_none() {
            return Err(ChannelError::NoNode(path.to_string()));
        }
        Ok(())
    }

    fn children(&self, path: &str) -> Result<Vec<String>, ChannelError> {
        let state = self.lock();
        if !state.nodes.contains_key(path) {
            return Err(ChannelError::NoNode(path.to_string()));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        Ok(state
            .nodes
            .keys()
            .filter(|k| k.as_str() != path && k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .map(|k| k[prefix.len()..].to_string())
            .collect())
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: std::time::Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    condition()
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}
