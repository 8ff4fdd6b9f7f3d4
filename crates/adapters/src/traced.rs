// SPDX-License-Identifier: MIT

//! Traced channel wrapper for consistent observability

use roost_core::{ChannelError, CreateMode, NodeChannel};

/// Wrapper that adds tracing to any NodeChannel
#[derive(Clone)]
pub struct TracedChannel<C> {
    inner: C,
}

impl<C> TracedChannel<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: NodeChannel> NodeChannel for TracedChannel<C> {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String, ChannelError> {
        let span = tracing::debug_span!("channel.create", path, mode = ?mode);
        let _guard = span.enter();

        let start = std::time::Instant::now();
        let result = self.inner.create(path, data, mode);
        let elapsed = start.elapsed();

        match &result {
            Ok(actual) => tracing::debug!(
                actual = %actual,
                data_len = data.len(),
                elapsed_us = elapsed.as_micros() as u64,
                "created"
            ),
            Err(e) => tracing::debug!(
                elapsed_us = elapsed.as_micros() as u64,
                error = %e,
                "create failed"
            ),
        }
        result
    }

    fn exists(&self, path: &str, watch: bool) -> Result<bool, ChannelError> {
        let result = self.inner.exists(path, watch);
        match &result {
            Ok(found) => tracing::trace!(path, watch, found, "exists"),
            Err(e) => tracing::debug!(path, watch, error = %e, "exists failed"),
        }
        result
    }

    fn delete(&self, path: &str) -> Result<(), ChannelError> {
        let span = tracing::debug_span!("channel.delete", path);
        let _guard = span.enter();

        let result = self.inner.delete(path);
        match &result {
            Ok(()) => tracing::debug!("deleted"),
            Err(e) => tracing::debug!(error = %e, "delete failed"),
        }
        result
    }

    fn children(&self, path: &str) -> Result<Vec<String>, ChannelError> {
        let result = self.inner.children(path);
        match &result {
            Ok(names) => tracing::trace!(path, count = names.len(), "children"),
            Err(e) => tracing::debug!(path, error = %e, "children failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
