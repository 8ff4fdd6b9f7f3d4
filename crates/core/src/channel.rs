// SPDX-License-Identifier: MIT

//! Channel trait for the coordination service
//!
//! The wire protocol, session negotiation, and node CRUD beyond what the
//! core needs live behind this seam. Implementations deliver their
//! asynchronous events through the session's event queue; the methods here
//! are the synchronous calls the core issues.

use crate::error::ChannelError;

/// How a node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
    Sequential,
    EphemeralSequential,
}

impl CreateMode {
    /// Ephemeral nodes are discarded by the service when the owning
    /// session dies
    pub fn is_ephemeral(self) -> bool {
        matches!(
            self,
            CreateMode::Ephemeral | CreateMode::EphemeralSequential
        )
    }

    /// Sequential nodes get a service-assigned monotonic suffix
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::Sequential | CreateMode::EphemeralSequential
        )
    }
}

/// An already-connected session to the coordination service
pub trait NodeChannel: Send + Sync {
    /// Create a node. Returns the actual path, which carries the sequence
    /// suffix for sequential modes.
    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String, ChannelError>;

    /// Whether a node exists, optionally arming a one-shot watch on the
    /// path. The watch fires on the next create, delete, or data change,
    /// then must be re-armed.
    fn exists(&self, path: &str, watch: bool) -> Result<bool, ChannelError>;

    /// Delete a node. `NoNode` if absent.
    fn delete(&self, path: &str) -> Result<(), ChannelError>;

    /// Names of the direct children of `path`, sorted
    fn children(&self, path: &str) -> Result<Vec<String>, ChannelError>;
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
