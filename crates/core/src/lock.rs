// SPDX-License-Identifier: MIT

//! Distributed mutual exclusion
//!
//! Classic sequential-ephemeral-node mutex: each bidder creates a
//! sequentially numbered ephemeral child under the lock path and holds the
//! lock while its number is the lowest among live siblings. A bidder that
//! is not lowest watches only the next-lower-numbered sibling, so one
//! deletion wakes exactly one waiter. Because the bid nodes are ephemeral,
//! the service discards them on session death and ownership can never leak
//! across sessions.

use crate::channel::{CreateMode, NodeChannel};
use crate::error::{ChannelError, LockError, WaitError};
use crate::waiter::WaitRegistry;
use std::sync::Arc;
use std::time::Instant;

/// Builds distributed locks over a channel and the wait registry
pub struct LockService {
    channel: Arc<dyn NodeChannel>,
    registry: Arc<WaitRegistry>,
    prefix: String,
}

impl LockService {
    pub fn new(channel: Arc<dyn NodeChannel>, registry: Arc<WaitRegistry>, prefix: String) -> Self {
        Self {
            channel,
            registry,
            prefix,
        }
    }

    /// Acquire the lock at `path`, blocking until held
    pub fn acquire(&self, path: &str) -> Result<LockGuard, LockError> {
        self.acquire_with_deadline(path, None)
    }

    /// Acquire the lock at `path`, giving up once `deadline` passes
    ///
    /// On timeout the abandoned bid node is deleted so it never blocks the
    /// next sibling.
    pub fn acquire_with_deadline(
        &self,
        path: &str,
        deadline: Option<Instant>,
    ) -> Result<LockGuard, LockError> {
        self.ensure_path(path)?;

        let bid = format!("{}/{}", path, self.prefix);
        let node = self
            .channel
            .create(&bid, b"", CreateMode::EphemeralSequential)?;
        let own_seq = match sequence_of(node_name(&node), &self.prefix) {
            Some(seq) => seq,
            None => {
                // The service returned a node that does not carry our
                // prefix and suffix; give it back rather than hold a bid
                // we cannot rank.
                let _ = self.channel.delete(&node);
                return Err(LockError::Channel(ChannelError::NoNode(node)));
            }
        };
        tracing::debug!(path, node = %node, "lock bid placed");

        loop {
            // Re-list every pass: a sibling may have vanished through
            // session death rather than orderly release, so rank is
            // recomputed instead of assumed to advance by one.
            let mut lower: Option<(u64, String)> = None;
            for name in self.channel.children(path)? {
                if let Some(seq) = sequence_of(&name, &self.prefix) {
                    if seq < own_seq && lower.as_ref().map(|(s, _)| seq > *s).unwrap_or(true) {
                        lower = Some((seq, name));
                    }
                }
            }

            let sibling = match lower {
                None => {
                    tracing::debug!(path, node = %node, "lock held");
                    return Ok(LockGuard {
                        channel: Arc::clone(&self.channel),
                        node,
                        released: false,
                    });
                }
                Some((_, name)) => format!("{}/{}", path, name),
            };

            match self
                .registry
                .block_until_node_deleted(self.channel.as_ref(), &sibling, deadline)
            {
                Ok(()) => {}
                Err(err @ WaitError::Timeout { .. }) => {
                    let _ = self.channel.delete(&node);
                    return Err(LockError::Wait(err));
                }
                Err(err) => return Err(LockError::Wait(err)),
            }
        }
    }

    /// Run `action` while holding the lock at `path`
    ///
    /// The lock is released on every exit path; a panic inside the action
    /// releases through the guard's drop.
    pub fn with_lock<T>(&self, path: &str, action: impl FnOnce() -> T) -> Result<T, LockError> {
        let guard = self.acquire(path)?;
        let out = action();
        guard.release();
        Ok(out)
    }

    /// Create `path` and any missing ancestors as persistent nodes
    fn ensure_path(&self, path: &str) -> Result<(), ChannelError> {
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            match self.channel.create(&prefix, b"", CreateMode::Persistent) {
                Ok(_) | Err(ChannelError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A held lock; deleting the bid node releases it
///
/// Release is idempotent relative to session death: if the session already
/// died the node is gone and release is a no-op.
pub struct LockGuard {
    channel: Arc<dyn NodeChannel>,
    node: String,
    released: bool,
}

impl LockGuard {
    /// Path of this bidder's sequential node
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Release the lock
    pub fn release(mut self) {
        self.delete_node();
    }

    fn delete_node(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.channel.delete(&self.node) {
            Ok(()) => tracing::debug!(node = %self.node, "lock released"),
            // Already gone: the session died and the service discarded it.
            Err(ChannelError::NoNode(_)) | Err(ChannelError::ConnectionLoss(_)) => {
                tracing::debug!(node = %self.node, "lock node already gone");
            }
            Err(e) => tracing::warn!(node = %self.node, error = %e, "lock release failed"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.delete_node();
    }
}

/// Parse the sequence number out of a bid node name
fn sequence_of(name: &str, prefix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Last path segment
fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
